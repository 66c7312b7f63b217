// ABOUTME: Simulated modem session: probes an in-memory AT port, enables the modem and tracks registration
// ABOUTME: The fake firmware answers AT commands over a tokio duplex stream with canned responses

//! # Probe Simulator
//!
//! ```bash
//! cargo run --example probe_sim
//!
//! # Firmware without +CREG reports, falling back to periodic checks
//! cargo run --example probe_sim -- --no-creg-reports --run-duration 70 -d
//! ```

use argh::FromArgs;
use modemcore::modem::{AtBearer, AtModem3gpp, Modem, RegistrationCheckConfig};
use modemcore::port::{PortDevice, PortProbe, ProbeConfig, ProbeFlags, SerialPort};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Probe and enable a simulated modem
#[derive(FromArgs)]
struct CliArgs {
    /// whether or not to enable debugging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// firmware rejects +CREG report setup
    #[argh(switch)]
    no_creg_reports: bool,

    /// registration check interval in seconds (default: 30)
    #[argh(option)]
    check_interval: Option<u64>,

    /// seconds to keep the modem enabled (default: 5)
    #[argh(option)]
    run_duration: Option<u64>,
}

fn reply(command: &str, creg_reports: bool) -> &'static str {
    match command {
        "AT" | "AT+CIND=?" | "AT+CMER=3,0,0,1" | "AT+CMER=0" | "AT+CREG=0" | "AT+CGREG=2"
        | "AT+CGREG=0" => "\r\nOK\r\n",
        "AT+CREG=2" | "AT+CREG=1" if creg_reports => "\r\nOK\r\n",
        "AT+CGMI" => "\r\n+CGMI: \"Huawei\"\r\n\r\nOK\r\n",
        "AT+CGMM" => "\r\n+CGMM: \"E1750\"\r\n\r\nOK\r\n",
        "AT+CGSN" => "\r\n356938035643809\r\n\r\nOK\r\n",
        "AT+CLCK=\"SC\",2" => "\r\n+CLCK: 1\r\n\r\nOK\r\n",
        "AT+CREG?" => "\r\n+CREG: 2,5,\"00C3\",\"A1B2C3\",2\r\n\r\nOK\r\n",
        "AT+CGREG?" => "\r\n+CGREG: 2,5,\"00C3\",\"A1B2C3\",2\r\n\r\nOK\r\n",
        "AT+COPS=3,2;+COPS?" => "\r\n+COPS: 0,2,\"310410\",2\r\n\r\nOK\r\n",
        "AT+COPS=3,0;+COPS?" => "\r\n+COPS: 0,0,\"AT&T\",2\r\n\r\nOK\r\n",
        _ => "\r\nERROR\r\n",
    }
}

async fn firmware(stream: DuplexStream, creg_reports: bool) -> std::io::Result<()> {
    let mut stream = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        line.clear();
        if stream.read_until(b'\r', &mut line).await? == 0 {
            return Ok(());
        }
        let command = String::from_utf8_lossy(&line);
        let command = command.trim();
        stream.get_mut().write_all(reply(command, creg_reports).as_bytes()).await?;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let level = if cli_args.debugging { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let (host, device) = duplex(4096);
    let simulator = tokio::spawn(firmware(device, !cli_args.no_creg_reports));
    let port = Arc::new(SerialPort::new("ttyUSB0", host));

    let probe = PortProbe::new(PortDevice::new("tty", "ttyUSB0"), "option1");
    let flags = ProbeFlags::AT | ProbeFlags::AT_VENDOR | ProbeFlags::AT_PRODUCT;
    let config = ProbeConfig::default();
    probe.run(flags, &port, &config).await?;
    info!(
        "Probed {}: {:?}, vendor {:?}, product {:?}",
        probe.key(),
        probe.port_type(),
        probe.vendor(),
        probe.product()
    );

    let check = RegistrationCheckConfig::new(Duration::from_secs(cli_args.check_interval.unwrap_or(30)));
    let modem: Modem<_, AtBearer<Arc<SerialPort<DuplexStream>>>> =
        Modem::new(AtModem3gpp::new(port.clone()), check);
    let cancel = CancellationToken::new();
    modem.initialize(&cancel).await?;
    modem.enable(&cancel).await?;

    let iface = modem.iface_3gpp();
    let operator = modem.status().operator();
    info!("IMEI {:?}, locks {:?}", iface.imei(), iface.facility_locks());
    info!(
        "Modem {} ({}), operator {:?} {:?}, access {}",
        modem.state(),
        iface.registration_state(),
        operator.name,
        operator.mcc_mnc,
        modem.status().access_tech()
    );
    if iface.periodic_checks_enabled() {
        warn!("No registration reports, polling instead");
    }

    tokio::time::sleep(Duration::from_secs(cli_args.run_duration.unwrap_or(5))).await;

    modem.disable().await?;
    info!("Modem {}", modem.state());
    simulator.abort();
    Ok(())
}
