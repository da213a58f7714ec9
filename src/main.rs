use eventflow::app;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    match app::startup::run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("eventflow: {err}");
            std::process::ExitCode::FAILURE
        }
    }
}
