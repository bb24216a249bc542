//! mDNS service responder.
//!
//! Announces a DNS-SD service on one interface and answers queries for it
//! until Ctrl-C, then says goodbye.
//!
//! ```text
//! cargo run --example responder -- --address 192.168.1.42 --hostname myhost
//! ```

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use clap::Parser;
use mdnsd::{MulticastSocket, Responder, ResponderConfig, ServiceDefinition};
use tokio::net::UdpSocket;

#[derive(Parser, Debug)]
#[command(name = "responder")]
#[command(about = "Announce an mDNS-SD service")]
struct Args {
    /// Local IPv4 address to advertise
    #[arg(long)]
    address: Ipv4Addr,

    /// Host name to claim (without .local)
    #[arg(long, default_value = "rust-mdns")]
    hostname: String,

    /// Service type to announce
    #[arg(long, default_value = "_http._tcp")]
    service: String,

    /// Service instance label
    #[arg(long, default_value = "web")]
    instance: String,

    /// Service port
    #[arg(long, default_value = "8080")]
    port: u16,

    /// TXT entries (key=value), repeatable
    #[arg(long)]
    txt: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let std_socket = MulticastSocket::new()
        .with_interface(args.address)
        .into_std()?;
    let socket = UdpSocket::from_std(std_socket)?;

    let config = ResponderConfig::default()
        .with_hostname(&args.hostname)
        .with_address(args.address)
        .with_service(
            ServiceDefinition::new(&args.service, &args.instance, args.port)
                .with_txt(args.txt.clone()),
        );
    let mut responder = Responder::new(config);
    responder.on_conflict(|name, rtype| {
        log::warn!("conflicting name detected: {name} ({rtype}); rename and restart");
    });

    log::info!(
        "Announcing {}.{}.local on {} port {}",
        args.instance,
        args.service,
        args.address,
        args.port
    );

    let mut buf = vec![0u8; 9000];
    let mut shutting_down = false;

    loop {
        let mut idle = true;
        while let Some((msg, dest)) = responder.output(Instant::now()) {
            socket.send_to(&msg.pack()?, dest).await?;
            idle = false;
        }
        if shutting_down && idle && responder.sleep(Instant::now()).is_none() {
            log::info!("goodbyes sent, exiting");
            return Ok(());
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
            _ = tokio::signal::ctrl_c(), if !shutting_down => {
                log::info!("shutting down");
                responder.shutdown(Instant::now());
                shutting_down = true;
            }
        }
    }
}
