// ABOUTME: Crate-level integration tests spanning the codec, probing and modem layers
// ABOUTME: Scripted channels stand in for modem firmware so whole flows run without hardware

use crate::error::ModemError;
use crate::modem::{AtModem3gpp, Messaging, Modem, ModemState, RegistrationCheckConfig, RegistrationState};
use crate::modem::{AtBearer, BearerProperties};
use crate::port::mock::{Reply, ScriptedChannel};
use crate::port::{PortDevice, PortProbe, PortType, ProbeConfig, ProbeFlags, SerialPort};
use crate::sms::{PduError, SmsAssembler, SmsPdu, SubmitOptions, build_submit_pdus, parse_pdu};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Rewrites an SMS-SUBMIT into the SMS-DELIVER the recipient would get
fn submit_to_deliver(pdu: &SmsPdu) -> Vec<u8> {
    let bytes = pdu.as_bytes();
    let start = pdu.msg_start();
    let first_octet = bytes[start];
    let address_len = 2 + usize::from(bytes[start + 2]).div_ceil(2);
    let address = &bytes[start + 2..start + 2 + address_len];
    let mut offset = start + 2 + address_len;
    let pid_dcs = &bytes[offset..offset + 2];
    offset += 2;
    if first_octet & 0x18 == 0x10 {
        offset += 1;
    }

    let mut deliver = bytes[..start].to_vec();
    deliver.push(0x04 | (first_octet & 0x40));
    deliver.extend_from_slice(address);
    deliver.extend_from_slice(pid_dcs);
    deliver.extend_from_slice(&[0x42, 0x10, 0x91, 0x21, 0x43, 0x65, 0x00]);
    deliver.extend_from_slice(&bytes[offset..]);
    deliver
}

fn round_trip(number: &str, text: &str, options: &SubmitOptions) -> (usize, String, String) {
    let pdus = build_submit_pdus(number, text, options).unwrap();
    let mut assembler = SmsAssembler::new();
    let mut complete = None;
    for pdu in &pdus {
        let hex_pdu = hex::encode(submit_to_deliver(pdu));
        complete = assembler.push(parse_pdu(&hex_pdu).unwrap());
    }
    let message = complete.unwrap();
    (pdus.len(), message.number().to_string(), message.text)
}

#[test]
fn test_gsm7_round_trip() {
    let (parts, number, text) = round_trip("+15551234567", "Hello, World! [1]", &SubmitOptions::new());
    assert_eq!(parts, 1);
    assert_eq!(number, "+15551234567");
    assert_eq!(text, "Hello, World! [1]");
}

#[test]
fn test_round_trip_with_smsc_and_validity() {
    let options = SubmitOptions::new()
        .with_smsc("+31624000000")
        .with_validity_minutes(60)
        .with_status_report();
    let (_, number, text) = round_trip("5551234", "status please", &options);
    assert_eq!(number, "5551234");
    assert_eq!(text, "status please");
}

#[test]
fn test_multipart_round_trip() {
    let text = "The quick brown fox jumps over the lazy dog. ".repeat(8);
    let (parts, _, decoded) = round_trip("+15551234567", &text, &SubmitOptions::new());
    assert_eq!(parts, text.len().div_ceil(153));
    assert_eq!(decoded, text);
}

#[test]
fn test_ucs2_multipart_round_trip() {
    let text = "Привет, как дела? ".repeat(6);
    let (parts, _, decoded) = round_trip("+15551234567", &text, &SubmitOptions::new());
    assert_eq!(parts, 2);
    assert_eq!(decoded, text);
}

#[test]
fn test_fixture_pdu() {
    let message =
        parse_pdu("07911326040000F0040B911346610089F60000208062917314080CC8F71D14969741F977FD07")
            .unwrap();
    assert_eq!(message.number(), "+31641600986");
    assert!(!message.text.is_empty());
}

#[test]
fn test_short_pdu_is_malformed() {
    assert!(matches!(parse_pdu("00"), Err(PduError::MalformedPdu(_))));
    let err: ModemError = parse_pdu("00").unwrap_err().into();
    assert!(matches!(err, ModemError::Pdu(PduError::MalformedPdu(_))));
}

/// Firmware that registers at home on a Dutch network
fn registered_firmware() -> ScriptedChannel {
    firmware().on("AT+CREG=2", Reply::ok())
}

/// Same firmware, without `+CREG` report setup
fn firmware() -> ScriptedChannel {
    ScriptedChannel::new()
        .on("AT", Reply::ok())
        .on("AT+CGMI", Reply::text("\r\nhuawei\r\n\r\nOK\r\n"))
        .on("AT+CGMM", Reply::text("\r\nE1750\r\n\r\nOK\r\n"))
        .on("AT+CGSN", Reply::text("\r\n356938035643809\r\n\r\nOK\r\n"))
        .on("AT+CIND=?", Reply::ok())
        .on("AT+CMER=3,0,0,1", Reply::ok())
        .on("AT+CMER=0", Reply::ok())
        .on("AT+CREG=0", Reply::ok())
        .on("AT+CGREG=2", Reply::ok())
        .on("AT+CGREG=0", Reply::ok())
        .on("AT+CREG?", Reply::text("\r\n+CREG: 2,1,\"1F\",\"2B3C\",2\r\n\r\nOK\r\n"))
        .on("AT+CGREG?", Reply::text("\r\n+CGREG: 2,1,\"1F\",\"2B3C\",2\r\n\r\nOK\r\n"))
        .on("AT+COPS=3,2;+COPS?", Reply::text("\r\n+COPS: 0,2,\"20404\",2\r\n\r\nOK\r\n"))
        .on("AT+COPS=3,0;+COPS?", Reply::text("\r\n+COPS: 0,0,\"vodafone NL\",2\r\n\r\nOK\r\n"))
        .on("AT+CMGF=0", Reply::ok())
}

#[tokio::test(start_paused = true)]
async fn test_probe_then_enable_and_send() {
    let channel = Arc::new(registered_firmware());
    let probe = PortProbe::new(PortDevice::new("tty", "ttyUSB0"), "option1");
    let flags = ProbeFlags::AT | ProbeFlags::AT_VENDOR | ProbeFlags::AT_PRODUCT;
    probe.run(flags, &channel, &ProbeConfig::default()).await.unwrap();
    assert_eq!(probe.port_type(), PortType::At);
    assert_eq!(probe.vendor().as_deref(), Some("huawei"));

    let modem: Modem<_, AtBearer<Arc<ScriptedChannel>>> =
        Modem::new(AtModem3gpp::new(channel.clone()), RegistrationCheckConfig::default());
    let cancel = CancellationToken::new();
    modem.initialize(&cancel).await.unwrap();
    modem.enable(&cancel).await.unwrap();

    assert_eq!(modem.state(), ModemState::Registered);
    let iface = modem.iface_3gpp();
    assert_eq!(iface.imei().as_deref(), Some("356938035643809"));
    assert_eq!(iface.registration_state(), RegistrationState::Home);
    assert!(!iface.periodic_checks_enabled());
    let operator = modem.status().operator();
    assert_eq!(operator.mcc_mnc, Some((204, 4)));
    assert_eq!(operator.name.as_deref(), Some("vodafone NL"));

    let pdu = build_submit_pdus("+31612345678", "hi", &SubmitOptions::new())
        .unwrap()
        .remove(0);
    let mut body = pdu.to_hex().into_bytes();
    body.push(0x1a);
    let firmware = registered_firmware()
        .on(&format!("AT+CMGS={}", pdu.tpdu_len()), Reply::text("\r\n> "))
        .on_bytes(body, Reply::text("\r\n+CMGS: 7\r\n\r\nOK\r\n"));
    let messaging = Messaging::new(firmware, modem.status().clone());
    let references = messaging
        .send("+31612345678", "hi", &SubmitOptions::new())
        .await
        .unwrap();
    assert_eq!(references, vec![Some(7)]);

    modem.disable().await.unwrap();
    assert_eq!(modem.state(), ModemState::Disabled);
    for command in ["AT+CGREG=0", "AT+CREG=0", "AT+CMER=0"] {
        assert_eq!(channel.count(command), 1, "{command}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_modem_without_registration_reports_polls() {
    let channel = Arc::new(
        firmware()
            .on("AT+CREG=2", Reply::error())
            .on("AT+CREG=1", Reply::error()),
    );
    let modem: Modem<_, AtBearer<Arc<ScriptedChannel>>> =
        Modem::new(AtModem3gpp::new(channel.clone()), RegistrationCheckConfig::default());
    modem.enable(&CancellationToken::new()).await.unwrap();
    assert!(modem.iface_3gpp().periodic_checks_enabled());
    assert_eq!(channel.count("AT+CREG?"), 1);

    tokio::time::sleep(std::time::Duration::from_secs(31)).await;
    assert_eq!(channel.count("AT+CREG?"), 2);

    modem.disable().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_secs(90)).await;
    assert_eq!(channel.count("AT+CREG?"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_dial_up_connection() {
    let channel = Arc::new(
        registered_firmware()
            .on("AT+CGDCONT=1,\"IP\",\"internet\"", Reply::ok())
            .on("ATD*99***1#", Reply::text("\r\nCONNECT\r\n")),
    );
    let modem = Modem::new(AtModem3gpp::new(channel.clone()), RegistrationCheckConfig::default());
    let cancel = CancellationToken::new();
    modem.enable(&cancel).await.unwrap();

    let bearer = modem.create_bearer(AtBearer::new(channel.clone(), BearerProperties::new("internet")));
    modem.connect(&bearer, &cancel).await.unwrap();
    assert_eq!(modem.state(), ModemState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_reenabled_modem_connects() {
    let channel = Arc::new(
        registered_firmware()
            .on("AT+CGDCONT=1,\"IP\",\"internet\"", Reply::ok())
            .on("ATD*99***1#", Reply::text("\r\nCONNECT\r\n")),
    );
    let modem = Modem::new(AtModem3gpp::new(channel.clone()), RegistrationCheckConfig::default());
    let cancel = CancellationToken::new();
    modem.enable(&cancel).await.unwrap();
    modem.disable().await.unwrap();
    assert_eq!(modem.status().operator().mcc_mnc, None);

    modem.enable(&cancel).await.unwrap();
    assert_eq!(modem.state(), ModemState::Registered);
    assert_eq!(modem.status().operator().mcc_mnc, Some((204, 4)));
    let bearer = modem.create_bearer(AtBearer::new(channel.clone(), BearerProperties::new("internet")));
    modem.connect(&bearer, &cancel).await.unwrap();
    assert_eq!(modem.state(), ModemState::Connected);
}

fn serial_reply(command: &str) -> &'static str {
    match command {
        "AT+CIND=?" | "AT+CMER=3,0,0,1" | "AT+CMER=0" | "AT+CREG=2" | "AT+CREG=0" | "AT+CGREG=2"
        | "AT+CGREG=0" => "\r\nOK\r\n",
        // the PS line comes first and must not count as the CS answer
        "AT+CREG?" => "\r\n+CGREG: 2,5,\"00C3\",\"A1B2C3\",2\r\n+CREG: 2,2\r\n\r\nOK\r\n",
        "AT+CGREG?" => "\r\n+CGREG: 2,0\r\n\r\nOK\r\n",
        "AT+COPS=3,2;+COPS?" => "\r\n+COPS: 0,2,\"310410\",2\r\n\r\nOK\r\n",
        "AT+COPS=3,0;+COPS?" => "\r\n+COPS: 0,0,\"AT&T\",2\r\n\r\nOK\r\n",
        _ => "\r\nERROR\r\n",
    }
}

/// Answers commands and writes whatever `unsolicited` hands it in between
async fn serial_firmware(stream: DuplexStream, mut unsolicited: mpsc::UnboundedReceiver<&'static str>) {
    let mut stream = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        tokio::select! {
            read = stream.read_until(b'\r', &mut line) => {
                if read.unwrap_or(0) == 0 {
                    return;
                }
                let command = String::from_utf8_lossy(&line).trim().to_string();
                line.clear();
                if stream.get_mut().write_all(serial_reply(&command).as_bytes()).await.is_err() {
                    return;
                }
            }
            Some(report) = unsolicited.recv() => {
                if stream.get_mut().write_all(report.as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[tokio::test]
async fn test_unsolicited_registration_over_serial_port() {
    let (host, device) = duplex(1024);
    let (unsolicited, reports) = mpsc::unbounded_channel();
    tokio::spawn(serial_firmware(device, reports));
    let port = Arc::new(SerialPort::new("ttyUSB2", host));

    let modem: Modem<_, AtBearer<Arc<SerialPort<DuplexStream>>>> =
        Modem::new(AtModem3gpp::new(port.clone()), RegistrationCheckConfig::default());
    modem.enable(&CancellationToken::new()).await.unwrap();
    assert_eq!(modem.state(), ModemState::Searching);
    let iface = modem.iface_3gpp();
    assert!(iface.listening_for_reports());
    assert!(!iface.periodic_checks_enabled());

    unsolicited.send("\r\n+CREG: 1,\"00C3\",\"A1B2C3\",2\r\n").unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(iface.registration_state(), RegistrationState::Home);
    assert_eq!(modem.state(), ModemState::Registered);
    assert_eq!(modem.status().operator().mcc_mnc, Some((310, 410)));

    modem.disable().await.unwrap();
    assert!(!iface.listening_for_reports());
    unsolicited.send("\r\n+CREG: 5\r\n").unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(iface.registration_state(), RegistrationState::Unknown);
}

