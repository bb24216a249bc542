//! mDNS query tool.
//!
//! Issues a continuous mDNS query and prints every answer as it arrives.
//!
//! ```text
//! cargo run --example mquery -- --name _ipp._tcp.local --rtype 12
//! ```

use std::time::{Duration, Instant};

use clap::Parser;
use mdnsd::{MulticastSocket, Name, RecordType, Responder, ResponderConfig};
use tokio::net::UdpSocket;

#[derive(Parser, Debug)]
#[command(name = "mquery")]
#[command(about = "Query mDNS for a name and print the answers")]
struct Args {
    /// Name to query for
    #[arg(long, default_value = "_services._dns-sd._udp.local")]
    name: String,

    /// Numeric record type (1=A, 12=PTR, 16=TXT, 33=SRV, 255=ANY)
    #[arg(long, default_value = "12")]
    rtype: u16,

    /// Stop after this many seconds (0 = run until Ctrl-C)
    #[arg(long, default_value = "0")]
    wait: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let qname = Name::new(&args.name)?;
    let rtype = RecordType::from(args.rtype);

    let std_socket = MulticastSocket::new().into_std()?;
    let socket = UdpSocket::from_std(std_socket)?;

    let mut responder = Responder::new(ResponderConfig::default());
    responder.query(&qname, rtype, |record| println!("+ {record}"));

    println!("Querying for {} type {rtype} ... press Ctrl-C to stop", args.name);
    let deadline = (args.wait > 0).then(|| Instant::now() + Duration::from_secs(args.wait));
    let mut buf = vec![0u8; 9000];

    loop {
        while let Some((msg, dest)) = responder.output(Instant::now()) {
            socket.send_to(&msg.pack()?, dest).await?;
        }

        let wakeup = responder.sleep(Instant::now());
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                let (len, src) = result?;
                responder.input_packet(&buf[..len], src, Instant::now());
            }
            _ = async {
                match wakeup {
                    Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                    None => tokio::time::sleep(Duration::from_secs(3600)).await,
                }
            } => {}
            _ = tokio::signal::ctrl_c() => {
                return Ok(());
            }
        }

        if let Some(at) = deadline {
            if Instant::now() >= at {
                return Ok(());
            }
        }
    }
}
