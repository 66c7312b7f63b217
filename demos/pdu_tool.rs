// ABOUTME: Command-line SMS PDU tool: decodes SMS-DELIVER hex and builds SMS-SUBMIT PDUs
// ABOUTME: Prints what an AT+CMGS exchange would carry for each part of a message

//! # SMS PDU Tool
//!
//! ```bash
//! # Decode a received PDU
//! cargo run --example pdu_tool -- \
//!   --decode 07911326040000F0040B911346610089F60000208062917314080CC8F71D14969741F977FD07
//!
//! # Build the PDUs for a message
//! cargo run --example pdu_tool -- --to +15551234567 --text "Hello, World!" \
//!   --smsc +31624000000 --validity 60 --status-report
//! ```

use argh::FromArgs;
use modemcore::sms::{SubmitOptions, build_submit_pdus, parse_pdu};
use std::error::Error;
use tracing::{Level, debug};
use tracing_subscriber::FmtSubscriber;

/// Decode or build SMS PDUs
#[derive(FromArgs)]
struct CliArgs {
    /// whether or not to enable debugging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// hex SMS-DELIVER PDU to decode, SMSC address included
    #[argh(option)]
    decode: Option<String>,

    /// destination number of the message to build
    #[argh(option, short = 't')]
    to: Option<String>,

    /// text of the message to build
    #[argh(option)]
    text: Option<String>,

    /// SMSC to route through (default: the modem's own)
    #[argh(option)]
    smsc: Option<String>,

    /// relative validity in minutes (default: omitted)
    #[argh(option)]
    validity: Option<u32>,

    /// request a status report
    #[argh(switch)]
    status_report: bool,
}

fn decode(hex_pdu: &str) -> Result<(), Box<dyn Error>> {
    let message = parse_pdu(hex_pdu)?;
    if let Some(smsc) = &message.smsc {
        println!("SMSC:      {}", smsc.number);
    }
    println!("From:      {}", message.number());
    println!("Timestamp: {}", message.timestamp);
    println!("Coding:    {:?}", message.data_coding);
    if let Some(class) = message.class {
        println!("Class:     {class:?}");
    }
    if let Some(concat) = message.concat {
        println!("Part:      {}/{} (reference {})", concat.sequence, concat.max, concat.reference);
    }
    println!("Text:      {}", message.text);
    Ok(())
}

fn encode(args: &CliArgs, to: &str, text: &str) -> Result<(), Box<dyn Error>> {
    let mut options = SubmitOptions::new();
    if let Some(smsc) = &args.smsc {
        options = options.with_smsc(smsc);
    }
    if let Some(minutes) = args.validity {
        options = options.with_validity_minutes(minutes);
    }
    if args.status_report {
        options = options.with_status_report();
    }

    let pdus = build_submit_pdus(to, text, &options)?;
    debug!("{} part(s)", pdus.len());
    for pdu in &pdus {
        println!("AT+CMGS={}", pdu.tpdu_len());
        println!("{}<Ctrl-Z>", pdu.to_hex());
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let level = if cli_args.debugging { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match (&cli_args.decode, &cli_args.to, &cli_args.text) {
        (Some(hex_pdu), _, _) => decode(hex_pdu),
        (None, Some(to), Some(text)) => encode(&cli_args, to, text),
        _ => Err("either --decode or both --to and --text are required".into()),
    }
}
