use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;

use nirlink::{Args, OutputFormat, fake_link_client, real_link_client, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut stdout = std::io::stdout();

    let run_result = async {
        let log_level = args.log_level();
        let output = args.output_format().unwrap_or(if stdout.is_terminal() {
            OutputFormat::Pretty
        } else {
            OutputFormat::Json
        });
        let (command, options, maybe_fake_args) = args.into_parts()?;
        let client = match maybe_fake_args {
            Some(fake_args) => fake_link_client(fake_args),
            None => real_link_client(),
        };

        run(command, options, output, log_level, &mut stdout, client).await
    }
    .await;

    match run_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
