// ABOUTME: Generic AT implementation of the 3GPP capability trait
// ABOUTME: Parses +CREG/+CGREG/+CEREG registration reports, +COPS operators and scans, and +CLCK lock status

use super::iface_3gpp::{FacilityLocks, Modem3gpp, RegistrationReports, parse_mcc_mnc};
use super::registration::{
    AccessTechnology, Domain, NetworkAvailability, NetworkInfo, RegistrationReport, RegistrationState,
};
use crate::error::{ModemError, ModemResult};
use crate::port::at::{at_command, strip_tag};
use crate::port::serial::CommandChannel;
use std::time::Duration;
use tracing::debug;

/// `AT+COPS=?` makes the modem scan every band
const SCAN_TIMEOUT: Duration = Duration::from_secs(120);

const REGISTRATION_TAGS: [(&str, Domain); 3] = [
    ("+CREG", Domain::Cs),
    ("+CGREG", Domain::Ps),
    ("+CEREG", Domain::Ps),
];

fn registration_state(stat: u8) -> RegistrationState {
    match stat {
        0 => RegistrationState::Idle,
        // 6 and 7 are the "SMS only" variants of home and roaming
        1 | 6 => RegistrationState::Home,
        2 => RegistrationState::Searching,
        3 => RegistrationState::Denied,
        5 | 7 => RegistrationState::Roaming,
        _ => RegistrationState::Unknown,
    }
}

fn parse_hex(field: &str) -> Option<u32> {
    let field = field.trim_matches('"');
    if field.is_empty() {
        return Some(0);
    }
    u32::from_str_radix(field, 16).ok()
}

fn has_tag(line: &str, tag: &str) -> bool {
    line.trim()
        .strip_prefix(tag)
        .is_some_and(|rest| rest.starts_with(':'))
}

/// Whether `line` is an unsolicited `+CREG`, `+CGREG` or `+CEREG` report
///
/// Unsolicited reports lead with `<stat>`: one field, three fields, or
/// four with a quoted LAC second. Solicited responses lead with `<n>`.
pub fn is_unsolicited_registration(line: &str) -> bool {
    let Some((tag, _)) = REGISTRATION_TAGS.iter().find(|(tag, _)| has_tag(line, tag)) else {
        return false;
    };
    let fields: Vec<&str> = strip_tag(line, tag).split(',').map(str::trim).collect();
    match fields.len() {
        1 | 3 => true,
        4 => fields[1].starts_with('"'),
        _ => false,
    }
}

/// Parses a `+CREG`, `+CGREG` or `+CEREG` line, solicited or unsolicited
///
/// Accepted shapes, after the tag:
///
/// ```text
/// <stat>                          unsolicited
/// <n>,<stat>                      solicited
/// <stat>,<lac>,<ci>[,<AcT>]       unsolicited
/// <n>,<stat>,<lac>,<ci>[,<AcT>]   solicited
/// ```
///
/// LAC and CI are hexadecimal, quoted or not.
pub fn parse_registration(line: &str) -> Option<(Domain, RegistrationReport)> {
    let line = line.trim();
    let (tag, domain) = REGISTRATION_TAGS.iter().find(|(tag, _)| has_tag(line, tag))?;
    let fields: Vec<&str> = strip_tag(line, tag).split(',').map(str::trim).collect();

    let (stat, location, act) = match fields.len() {
        1 => (fields[0], None, None),
        2 => (fields[1], None, None),
        3 => (fields[0], Some((fields[1], fields[2])), None),
        // a quoted second field is a LAC, so there is no <n>
        4 if fields[1].starts_with('"') => (fields[0], Some((fields[1], fields[2])), Some(fields[3])),
        4 => (fields[1], Some((fields[2], fields[3])), None),
        5 => (fields[1], Some((fields[2], fields[3])), Some(fields[4])),
        _ => {
            debug!("Unexpected registration response '{}'", line);
            return None;
        }
    };

    let mut report = RegistrationReport::new(registration_state(stat.parse().ok()?));
    if let Some((lac, ci)) = location {
        report = report.with_location(parse_hex(lac)?, parse_hex(ci)?);
    }
    if let Some(act) = act.and_then(|act| act.parse().ok()) {
        report = report.with_access_tech(AccessTechnology::from_act(act));
    } else if *tag == "+CEREG" {
        report = report.with_access_tech(AccessTechnology::LTE);
    }
    Some((*domain, report))
}

/// Extracts `<oper>` from a `+COPS?` response
///
/// Returns `None` when the modem is not registered with an operator.
pub fn parse_operator(response: &str) -> Option<String> {
    let fields: Vec<&str> = strip_tag(response, "+COPS").split(',').collect();
    let operator = fields.get(2)?.trim().trim_matches('"');
    (!operator.is_empty()).then(|| operator.to_string())
}

/// Top-level parenthesized groups; parentheses inside quotes don't count
fn parenthesized_groups(text: &str) -> Vec<&str> {
    let mut groups = Vec::new();
    let mut start = None;
    let mut quoted = false;
    for (i, c) in text.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '(' if !quoted && start.is_none() => start = Some(i + 1),
            ')' if !quoted => {
                if let Some(start) = start.take() {
                    groups.push(&text[start..i]);
                }
            }
            _ => {}
        }
    }
    groups
}

/// Splits on commas outside quotes
fn split_fields(text: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                fields.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(text[start..].trim());
    fields
}

fn unquoted(field: &str) -> Option<String> {
    let field = field.trim_matches('"').trim();
    (!field.is_empty()).then(|| field.to_string())
}

fn parse_network(entry: &str) -> Option<NetworkInfo> {
    let fields = split_fields(entry);
    if fields.len() < 4 {
        return None;
    }
    let status = NetworkAvailability::try_from(fields[0].parse::<u8>().ok()?).ok()?;
    let operator_code = unquoted(fields[3])?;
    parse_mcc_mnc(&operator_code)?;
    // networks reported without <AcT> are GSM
    let access_tech = match fields.get(4) {
        Some(act) => AccessTechnology::from_act(act.parse().ok()?),
        None => AccessTechnology::GSM,
    };
    Some(NetworkInfo {
        status,
        operator_long: unquoted(fields[1]),
        operator_short: unquoted(fields[2]),
        operator_code,
        access_tech,
    })
}

/// Parses the network list of an `AT+COPS=?` response
///
/// ```text
/// +COPS: (2,"vodafone NL","voda NL","20404",2),(1,"KPN","KPN","20408",0),,(0,1,3),(0,1,2)
/// ```
///
/// Entries without a usable operator code are skipped, which also drops
/// the trailing lists of supported modes and formats.
pub fn parse_network_scan(response: &str) -> Vec<NetworkInfo> {
    let networks: Vec<NetworkInfo> = parenthesized_groups(strip_tag(response, "+COPS"))
        .into_iter()
        .filter_map(|entry| {
            let network = parse_network(entry);
            if network.is_none() {
                debug!("Skipping network scan entry '({})'", entry);
            }
            network
        })
        .collect();
    networks
}

/// Parses `+CLCK: <status>` into whether the lock is enabled
pub fn parse_lock_status(response: &str) -> Option<bool> {
    match strip_tag(response, "+CLCK").split(',').next()?.trim() {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

/// 3GPP capabilities over the primary AT port of a modem
///
/// # Example
///
/// ```rust,no_run
/// use modemcore::modem::AtModem3gpp;
/// use modemcore::port::SerialPort;
/// use std::time::Duration;
///
/// # async fn example(tty: tokio::io::DuplexStream) {
/// let modem = AtModem3gpp::new(SerialPort::new("ttyUSB0", tty))
///     .with_command_timeout(Duration::from_secs(5));
/// # }
/// ```
#[derive(Debug)]
pub struct AtModem3gpp<C> {
    channel: C,
    command_timeout: Duration,
    lte_only: bool,
}

impl<C: CommandChannel> AtModem3gpp<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            command_timeout: Duration::from_secs(3),
            lte_only: false,
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Marks the modem LTE-only, so PS checks use `+CEREG`
    pub fn with_lte_only(mut self, lte_only: bool) -> Self {
        self.lte_only = lte_only;
        self
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    async fn command(&self, command: &str) -> ModemResult<String> {
        Ok(at_command(&self.channel, command, self.command_timeout).await?)
    }

    /// Enables registration reports with location, falling back to plain reports
    async fn enable_reports(&self, tag: &str) -> ModemResult<()> {
        if let Err(err) = self.command(&format!("AT{tag}=2")).await {
            debug!("Couldn't enable {} reports with location: '{}'", tag, err);
            self.command(&format!("AT{tag}=1")).await?;
        }
        Ok(())
    }

    async fn registration_check(&self, tag: &str) -> ModemResult<RegistrationReport> {
        let response = self.command(&format!("AT{tag}?")).await?;
        // other domains' unsolicited reports can land inside the response
        response
            .lines()
            .filter(|line| has_tag(line, tag))
            .find_map(parse_registration)
            .map(|(_, report)| report)
            .ok_or_else(|| ModemError::InvalidData(format!("unknown {tag} response '{response}'")))
    }

    async fn load_operator(&self, format: u8) -> ModemResult<String> {
        let response = self.command(&format!("AT+COPS=3,{format};+COPS?")).await?;
        parse_operator(&response)
            .ok_or_else(|| ModemError::InvalidData(format!("no operator in '{response}'")))
    }

    async fn lock_enabled(&self, facility: &str) -> ModemResult<bool> {
        let response = self.command(&format!("AT+CLCK=\"{facility}\",2")).await?;
        parse_lock_status(&response)
            .ok_or_else(|| ModemError::InvalidData(format!("unknown +CLCK response '{response}'")))
    }

    fn ps_tag(&self) -> &'static str {
        if self.lte_only { "+CEREG" } else { "+CGREG" }
    }
}

impl<C: CommandChannel> Modem3gpp for AtModem3gpp<C> {
    fn is_lte_only(&self) -> bool {
        self.lte_only
    }

    async fn load_imei(&self) -> ModemResult<String> {
        let response = self.command("AT+CGSN").await?;
        let imei = strip_tag(&response, "+CGSN").trim_matches('"');
        if imei.is_empty() || !imei.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ModemError::InvalidData(format!("invalid IMEI '{imei}'")));
        }
        Ok(imei.to_string())
    }

    async fn load_enabled_facility_locks(&self) -> ModemResult<FacilityLocks> {
        let mut locks = FacilityLocks::NONE;
        for (facility, lock) in [("SC", FacilityLocks::SIM), ("FD", FacilityLocks::FIXED_DIALING)] {
            match self.lock_enabled(facility).await {
                Ok(true) => locks.insert(lock),
                Ok(false) => {}
                Err(err) => debug!("Couldn't query lock state of '{}': '{}'", facility, err),
            }
        }
        Ok(locks)
    }

    async fn setup_unsolicited_registration(&self) -> ModemResult<Option<RegistrationReports>> {
        let reports = self
            .channel
            .subscribe_unsolicited(is_unsolicited_registration)
            .map(|lines| RegistrationReports::new(lines, parse_registration));
        Ok(reports)
    }

    async fn setup_indicators(&self) -> ModemResult<()> {
        self.command("AT+CIND=?").await.map(|_| ())
    }

    async fn enable_unsolicited_events(&self) -> ModemResult<()> {
        self.command("AT+CMER=3,0,0,1").await.map(|_| ())
    }

    async fn disable_unsolicited_events(&self) -> ModemResult<()> {
        self.command("AT+CMER=0").await.map(|_| ())
    }

    async fn setup_cs_registration(&self) -> ModemResult<()> {
        self.enable_reports("+CREG").await
    }

    async fn cleanup_cs_registration(&self) -> ModemResult<()> {
        self.command("AT+CREG=0").await.map(|_| ())
    }

    async fn setup_ps_registration(&self) -> ModemResult<()> {
        self.enable_reports(self.ps_tag()).await
    }

    async fn cleanup_ps_registration(&self) -> ModemResult<()> {
        self.command(&format!("AT{}=0", self.ps_tag())).await.map(|_| ())
    }

    async fn run_cs_registration_check(&self) -> ModemResult<RegistrationReport> {
        self.registration_check("+CREG").await
    }

    async fn run_ps_registration_check(&self) -> ModemResult<RegistrationReport> {
        self.registration_check(self.ps_tag()).await
    }

    async fn load_operator_code(&self) -> ModemResult<String> {
        self.load_operator(2).await
    }

    async fn load_operator_name(&self) -> ModemResult<String> {
        self.load_operator(0).await
    }

    async fn register_in_network(&self, operator_id: Option<&str>, timeout: Duration) -> ModemResult<()> {
        let command = match operator_id {
            Some(id) => format!("AT+COPS=1,2,\"{id}\""),
            None => "AT+COPS=0".to_string(),
        };
        at_command(&self.channel, &command, timeout).await?;
        Ok(())
    }

    async fn scan_networks(&self) -> ModemResult<Vec<NetworkInfo>> {
        let response = at_command(&self.channel, "AT+COPS=?", SCAN_TIMEOUT).await?;
        Ok(parse_network_scan(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::{Reply, ScriptedChannel};

    #[test]
    fn test_parse_solicited_creg() {
        let (domain, report) = parse_registration("+CREG: 0,1").unwrap();
        assert_eq!(domain, Domain::Cs);
        assert_eq!(report, RegistrationReport::new(RegistrationState::Home));

        let (_, report) = parse_registration("+CREG: 2,5,\"1F\",\"2B3C\"").unwrap();
        assert_eq!(report.state, RegistrationState::Roaming);
        assert_eq!((report.lac, report.cell_id), (0x1f, 0x2b3c));
        assert!(report.access_tech.is_unknown());

        let (_, report) = parse_registration("+CREG: 2,1,\"1F\",\"2B3C\",2").unwrap();
        assert_eq!(report.access_tech, AccessTechnology::UMTS);
    }

    #[test]
    fn test_parse_unsolicited_creg() {
        let (_, report) = parse_registration("+CREG: 2").unwrap();
        assert_eq!(report.state, RegistrationState::Searching);

        let (_, report) = parse_registration("+CREG: 1,\"00C3\",\"A1B2C3\"").unwrap();
        assert_eq!(report.state, RegistrationState::Home);
        assert_eq!((report.lac, report.cell_id), (0xc3, 0xa1b2c3));

        let (_, report) = parse_registration("+CREG: 1,\"00C3\",\"A1B2C3\",7").unwrap();
        assert_eq!(report.access_tech, AccessTechnology::LTE);
    }

    #[test]
    fn test_parse_ps_registration() {
        let (domain, report) = parse_registration("+CGREG: 0,3").unwrap();
        assert_eq!(domain, Domain::Ps);
        assert_eq!(report.state, RegistrationState::Denied);

        let (domain, report) = parse_registration("+CEREG: 1,\"1A2B\",\"01A2B3C4\"").unwrap();
        assert_eq!(domain, Domain::Ps);
        assert_eq!(report.access_tech, AccessTechnology::LTE);
        assert_eq!(report.lac, 0x1a2b);
    }

    #[test]
    fn test_parse_registration_rejects_garbage() {
        assert!(parse_registration("+CREG: x").is_none());
        assert!(parse_registration("+CREG: 1,\"ZZ\",\"01\"").is_none());
        assert!(parse_registration("+CMTI: \"SM\",3").is_none());
        assert!(parse_registration("+CREGX: 1").is_none());
    }

    #[test]
    fn test_parse_operator() {
        assert_eq!(parse_operator("+COPS: 0,2,\"20404\",2").as_deref(), Some("20404"));
        assert_eq!(parse_operator("+COPS: 0,0,\"vodafone NL\"").as_deref(), Some("vodafone NL"));
        assert_eq!(parse_operator("+COPS: 0"), None);
    }

    #[test]
    fn test_unsolicited_registration_shapes() {
        assert!(is_unsolicited_registration("+CREG: 1"));
        assert!(is_unsolicited_registration("+CGREG: 1,\"00C3\",\"A1B2C3\""));
        assert!(is_unsolicited_registration("+CEREG: 1,\"00C3\",\"A1B2C3\",7"));
        assert!(!is_unsolicited_registration("+CREG: 2,1"));
        assert!(!is_unsolicited_registration("+CREG: 2,1,\"1F\",\"2B3C\""));
        assert!(!is_unsolicited_registration("+CREG: 2,1,\"1F\",\"2B3C\",2"));
        assert!(!is_unsolicited_registration("+CMTI: \"SM\",3"));
        assert!(!is_unsolicited_registration("OK"));
    }

    #[test]
    fn test_parse_network_scan() {
        let networks = parse_network_scan(
            "+COPS: (2,\"vodafone NL\",\"voda NL\",\"20404\",2),(1,\"KPN\",\"KPN\",\"20408\",0),\
             (3,\"T-Mobile NL\",\"TMO NL\",\"20416\",7),,(0,1,3,4),(0,1,2)",
        );
        assert_eq!(networks.len(), 3);
        assert_eq!(networks[0].status, NetworkAvailability::Current);
        assert_eq!(networks[0].operator_long.as_deref(), Some("vodafone NL"));
        assert_eq!(networks[0].operator_short.as_deref(), Some("voda NL"));
        assert_eq!(networks[0].operator_code, "20404");
        assert_eq!(networks[0].access_tech, AccessTechnology::UMTS);
        assert_eq!(networks[1].access_tech, AccessTechnology::GSM);
        assert_eq!(networks[2].status, NetworkAvailability::Forbidden);
        assert_eq!(networks[2].access_tech, AccessTechnology::LTE);
    }

    #[test]
    fn test_parse_empty_network_scan() {
        assert!(parse_network_scan("+COPS: ,,(0,1,3,4),(0,1,2)").is_empty());
        assert!(parse_network_scan("+COPS: ").is_empty());
        assert!(parse_network_scan("").is_empty());
    }

    #[test]
    fn test_parse_network_scan_quoted_separators() {
        let networks = parse_network_scan("+COPS: (1,\"Foo, (Mobile)\",\"Foo\",\"310410\",2)");
        assert_eq!(networks.len(), 1);
        assert_eq!(networks[0].operator_long.as_deref(), Some("Foo, (Mobile)"));
        assert_eq!(networks[0].operator_code, "310410");
    }

    #[test]
    fn test_parse_network_scan_without_access_tech() {
        let networks = parse_network_scan("+COPS: (1,\"\",\"\",\"20404\"),(9,\"Bad\",\"Bad\",\"20408\"),(1,\"X\",\"X\",\"\")");
        assert_eq!(networks.len(), 1);
        assert_eq!(networks[0].access_tech, AccessTechnology::GSM);
        assert_eq!(networks[0].operator_long, None);
        assert_eq!(networks[0].status, NetworkAvailability::Available);
    }

    #[test]
    fn test_parse_lock_status() {
        assert_eq!(parse_lock_status("+CLCK: 1"), Some(true));
        assert_eq!(parse_lock_status("+CLCK: 0"), Some(false));
        assert_eq!(parse_lock_status("+CLCK: ?"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_check() {
        let channel = ScriptedChannel::new()
            .on("AT+CREG?", Reply::text("\r\n+CREG: 2,1,\"1F\",\"2B3C\",2\r\n\r\nOK\r\n"));
        let modem = AtModem3gpp::new(channel);
        let report = modem.run_cs_registration_check().await.unwrap();
        assert_eq!(report.state, RegistrationState::Home);
        assert_eq!(report.access_tech, AccessTechnology::UMTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_check_ignores_other_domains() {
        let channel = ScriptedChannel::new()
            .on("AT+CGREG?", Reply::text("\r\n+CREG: 5\r\n\r\n+CGREG: 2,0\r\n\r\nOK\r\n"))
            .on("AT+CREG?", Reply::text("\r\n+CGREG: 1\r\n\r\n+CREG: 0,2\r\n\r\nOK\r\n"));
        let modem = AtModem3gpp::new(channel);
        assert_eq!(modem.run_ps_registration_check().await.unwrap().state, RegistrationState::Idle);
        assert_eq!(
            modem.run_cs_registration_check().await.unwrap().state,
            RegistrationState::Searching
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_check_without_own_line_fails() {
        let channel = ScriptedChannel::new().on("AT+CGREG?", Reply::text("\r\n+CREG: 1\r\n\r\nOK\r\n"));
        let modem = AtModem3gpp::new(channel);
        let err = modem.run_ps_registration_check().await.unwrap_err();
        assert!(matches!(err, ModemError::InvalidData(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsolicited_registration_subscribes() {
        let channel = ScriptedChannel::new();
        let modem = AtModem3gpp::new(channel);
        let mut reports = modem.setup_unsolicited_registration().await.unwrap().unwrap();
        assert!(modem.channel().push_unsolicited("+CGREG: 5"));
        assert!(!modem.channel().push_unsolicited("+CREG: 0,1"));
        let (domain, report) = reports.recv().await.unwrap();
        assert_eq!(domain, Domain::Ps);
        assert_eq!(report.state, RegistrationState::Roaming);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_in_network_commands() {
        let channel = ScriptedChannel::new()
            .on("AT+COPS=0", Reply::ok())
            .on("AT+COPS=1,2,\"20408\"", Reply::ok());
        let modem = AtModem3gpp::new(channel);
        let timeout = Duration::from_secs(60);
        modem.register_in_network(None, timeout).await.unwrap();
        modem.register_in_network(Some("20408"), timeout).await.unwrap();
        assert_eq!(modem.channel().sent(), vec!["AT+COPS=0", "AT+COPS=1,2,\"20408\""]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_networks() {
        let channel = ScriptedChannel::new().on(
            "AT+COPS=?",
            Reply::text("\r\n+COPS: (2,\"vodafone NL\",\"voda NL\",\"20404\",2),,(0,1,3,4),(0,1,2)\r\n\r\nOK\r\n"),
        );
        let modem = AtModem3gpp::new(channel);
        let networks = modem.scan_networks().await.unwrap();
        assert_eq!(networks.len(), 1);
        assert_eq!(networks[0].operator_code, "20404");
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_setup_falls_back() {
        let channel = ScriptedChannel::new()
            .on("AT+CREG=2", Reply::error())
            .on("AT+CREG=1", Reply::ok());
        let modem = AtModem3gpp::new(channel);
        modem.setup_cs_registration().await.unwrap();
        assert_eq!(modem.channel().sent(), vec!["AT+CREG=2", "AT+CREG=1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lte_only_uses_cereg() {
        let channel = ScriptedChannel::new()
            .on("AT+CEREG?", Reply::text("\r\n+CEREG: 0,5\r\n\r\nOK\r\n"));
        let modem = AtModem3gpp::new(channel).with_lte_only(true);
        let report = modem.run_ps_registration_check().await.unwrap();
        assert_eq!(report.state, RegistrationState::Roaming);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_imei_and_operator() {
        let channel = ScriptedChannel::new()
            .on("AT+CGSN", Reply::text("\r\n356938035643809\r\n\r\nOK\r\n"))
            .on("AT+COPS=3,2;+COPS?", Reply::text("\r\n+COPS: 0,2,\"20404\",2\r\n\r\nOK\r\n"));
        let modem = AtModem3gpp::new(channel);
        assert_eq!(modem.load_imei().await.unwrap(), "356938035643809");
        assert_eq!(modem.load_operator_code().await.unwrap(), "20404");
    }

    #[tokio::test(start_paused = true)]
    async fn test_facility_locks() {
        let channel = ScriptedChannel::new()
            .on("AT+CLCK=\"SC\",2", Reply::text("\r\n+CLCK: 1\r\n\r\nOK\r\n"))
            .on("AT+CLCK=\"FD\",2", Reply::text("\r\n+CME ERROR: 3\r\n"));
        let modem = AtModem3gpp::new(channel);
        assert_eq!(modem.load_enabled_facility_locks().await.unwrap(), FacilityLocks::SIM);
    }
}
