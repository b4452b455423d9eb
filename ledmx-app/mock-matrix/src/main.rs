use clap::Parser;
use std::net::TcpListener;
use tracing::{error, info};

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts {
    /// Address to listen on for host connections
    #[clap(long, default_value = "127.0.0.1:38400")]
    listen: String,
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts: Opts = Opts::parse();
    let listener = TcpListener::bind(&opts.listen)?;
    info!(addr = %opts.listen, "boot finished");

    // one SPP link at a time, like the real device
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                if let Err(e) = mock_matrix::run_connection(stream) {
                    error!(error = %e, "connection failed");
                }
            }
            Err(e) => error!(error = %e, "accept failed"),
        }
    }
    Ok(())
}
