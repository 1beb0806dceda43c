use crate::config::{AccessPoint, ProvisioningConfig, StationConfig};
use crate::connect::{CloudLink, WifiStation, connect_cloud_link, connect_network};
use crate::dynamic::DynamicFields;
use crate::error::Error;
use crate::flag::PortalFlag;
use crate::platform::{Board, ResetDetector};
use crate::portal::{PortalRequest, PortalResponse, PortalSession, UpdateOutcome, render_page};
use crate::record::{
    AuthToken, BoardName, CloudCredential, ConfigRecord, NUM_CLOUD_CREDENTIALS,
    NUM_WIFI_CREDENTIALS, WifiCredential,
};
use crate::storage::Storage;
use crate::store::{RecordStatus, RecordStore};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// [`ProvisioningManager::begin`] has not run yet.
    Booting,
    /// Connected with stored credentials, or reconnecting after a link loss.
    NormalOperation,
    /// Access point and portal are up.
    ConfigurationMode,
    /// A restart was requested. Terminal for this run.
    Rebooting,
}

/// Why config mode was entered.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortalReason {
    Forced,
    ForcedPersistent,
    /// The stored record was invalid, incomplete or the medium is unavailable.
    NoConfigData,
    ResetBurst,
    /// The stored credentials did not get both links up at boot.
    ConnectFailed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootDecision {
    /// Connect with the stored credentials.
    Connect,
    /// Open the portal. With `deadline` set, the device falls back to reconnecting once the
    /// config timeout expires without anybody using the portal.
    Portal { reason: PortalReason, deadline: bool },
}

/// The boot time policy.
///
/// A forced portal flag wins over everything else and never sets a deadline. A record that is
/// not usable opens the portal without deadline as well, the device must never connect with
/// placeholder credentials. A reset burst with a usable record opens the portal with deadline.
pub fn decide_boot(status: RecordStatus, reset_burst: bool, flag: PortalFlag) -> BootDecision {
    match (flag, status) {
        (PortalFlag::ForcedPersistent, _) => BootDecision::Portal {
            reason: PortalReason::ForcedPersistent,
            deadline: false,
        },
        (PortalFlag::Forced, _) => BootDecision::Portal {
            reason: PortalReason::Forced,
            deadline: false,
        },
        (PortalFlag::Normal, RecordStatus::Incomplete | RecordStatus::Unavailable) => {
            BootDecision::Portal {
                reason: PortalReason::NoConfigData,
                deadline: false,
            }
        }
        (PortalFlag::Normal, RecordStatus::Complete) if reset_burst => BootDecision::Portal {
            reason: PortalReason::ResetBurst,
            deadline: true,
        },
        (PortalFlag::Normal, RecordStatus::Complete) => BootDecision::Connect,
    }
}

/// Owns the configuration and every collaborator of the provisioning flow.
///
/// Call [`begin`](Self::begin) once at boot, then [`run`](Self::run) on every iteration of the
/// main loop, and route portal requests to [`handle_request`](Self::handle_request) while in
/// config mode.
pub struct ProvisioningManager<'a, S, W, L, B, R>
where
    S: Storage,
    W: WifiStation,
    L: CloudLink,
    B: Board,
    R: ResetDetector,
{
    store: RecordStore<S>,
    station: W,
    link: L,
    board: B,
    detector: R,
    config: ProvisioningConfig,
    station_config: StationConfig,
    fields: DynamicFields<'a>,
    default_record: Option<ConfigRecord>,

    record: ConfigRecord,
    record_status: RecordStatus,
    state: State,
    portal_reason: Option<PortalReason>,
    session: Option<PortalSession>,
    access_point: Option<AccessPoint>,
    // absolute uptime in ms, none while the portal has to stay open
    deadline: Option<u64>,
    failed_ticks: u8,
    restart_at: Option<u64>,
}

impl<'a, S, W, L, B, R> ProvisioningManager<'a, S, W, L, B, R>
where
    S: Storage,
    W: WifiStation,
    L: CloudLink,
    B: Board,
    R: ResetDetector,
{
    pub fn new(
        storage: S,
        station: W,
        link: L,
        board: B,
        detector: R,
        config: ProvisioningConfig,
    ) -> Self {
        let config = config.sanitized();
        let station_config = config.station(board.chip_id());
        let store = RecordStore::new(storage, &config.board_type);
        let record = ConfigRecord::blank(store.header());

        Self {
            store,
            station,
            link,
            board,
            detector,
            config,
            station_config,
            fields: DynamicFields::new(),
            default_record: None,
            record,
            record_status: RecordStatus::Incomplete,
            state: State::Booting,
            portal_reason: None,
            session: None,
            access_point: None,
            deadline: None,
            failed_ticks: 0,
            restart_at: None,
        }
    }

    /// Record written on first run or whenever the stored one turns out invalid, instead of the
    /// blank record.
    pub fn with_default_config(mut self, record: ConfigRecord) -> Self {
        self.default_record = Some(record);
        self
    }

    /// Application defined fields, persisted next to the record and shown in the portal.
    pub fn with_dynamic_fields(mut self, fields: DynamicFields<'a>) -> Self {
        self.fields = fields;
        self
    }

    /// Boot: loads the stored config, consults the portal flag and the reset detector and either
    /// connects or opens the portal.
    pub fn begin(&mut self) -> State {
        if self.state != State::Booting {
            warn!("provisioning: begin called twice");
            return self.state;
        }
        info!("provisioning: begin, hostname {}", self.station_config.hostname.as_str());

        let reset_burst = self.detector.detect_reset_burst();
        let restored = self
            .store
            .restore(self.default_record.as_ref(), &mut self.fields);
        self.record = restored.record;
        self.record_status = restored.status;
        let flag = self.store.portal_flag();

        let decision = decide_boot(restored.status, reset_burst, flag);
        info!(
            "provisioning: status {:?}, reset burst {}, flag {:?} => {:?}",
            restored.status,
            reset_burst,
            flag,
            decision
        );

        match decision {
            BootDecision::Connect => {
                if self.connect_stored(self.config.connect.boot_cloud_rounds) {
                    self.set_state(State::NormalOperation);
                } else {
                    self.enter_config_mode(PortalReason::ConnectFailed, true);
                }
            }
            BootDecision::Portal { reason, deadline } => {
                if flag == PortalFlag::Forced {
                    // a one-shot request is used up by this boot
                    if let Err(e) = self.store.clear_portal_flag() {
                        warn!("provisioning: clearing portal flag failed ({})", e);
                    }
                }
                self.enter_config_mode(reason, deadline);
            }
        }
        self.state
    }

    /// One supervisory tick. Returns the state after the tick.
    pub fn run(&mut self) -> State {
        match self.state {
            State::Booting => return self.begin(),
            State::Rebooting => return State::Rebooting,
            State::NormalOperation | State::ConfigurationMode => {}
        }

        self.detector.tick();
        let now = self.board.now_ms();

        if let Some(at) = self.restart_at {
            if now >= at {
                self.restart();
            }
            return self.state;
        }

        let links_up = self.station.is_connected() && self.link.is_connected();
        let config_mode = self.state == State::ConfigurationMode;

        if links_up {
            if config_mode && !self.portal_in_use() {
                info!("provisioning: links are back, leaving config mode");
                self.leave_config_mode();
            }
            return self.state;
        }

        if config_mode && self.deadline.is_none_or(|deadline| now < deadline) {
            // the user may be editing, or nobody may connect before a human configured us
            self.failed_ticks = 0;
            return self.state;
        }

        if config_mode && self.config.reset_if_config_timeout {
            self.failed_ticks = self.failed_ticks.saturating_add(1);
            if self.failed_ticks > self.config.retries_before_reset {
                warn!(
                    "provisioning: still offline after {} retries, restarting",
                    self.config.retries_before_reset
                );
                self.restart();
                return self.state;
            }
            info!("provisioning: config timeout, reconnect retry {}", self.failed_ticks);
        }

        if self.station.is_connected() {
            debug!("provisioning: cloud link lost, reconnecting");
            self.connect_cloud_round();
        } else {
            debug!("provisioning: wifi lost, reconnecting");
            self.connect_stored(1);
        }
        self.state
    }

    /// Serves one portal request. A complete set of field updates commits the session and
    /// schedules the restart.
    pub fn handle_request(&mut self, request: &PortalRequest) -> PortalResponse {
        let Some(session) = self.session.as_mut() else {
            debug!("provisioning: portal request outside of config mode ignored");
            return PortalResponse::ack();
        };

        match request {
            PortalRequest::Form => {
                // whoever opened the form gets all the time they need
                self.deadline = None;
                session.mark_page_served();
                let body = render_page(
                    self.title(),
                    &self.record,
                    &self.fields,
                    &self.config.portal,
                );
                PortalResponse::page(body, &self.config.portal)
            }
            PortalRequest::Update { key, value } => {
                if session.update(key, value) == UpdateOutcome::Complete {
                    self.commit();
                }
                PortalResponse::ack()
            }
        }
    }

    /// Parses `query` and serves it, see [`handle_request`](Self::handle_request).
    pub fn handle_query(&mut self, query: &str) -> PortalResponse {
        self.handle_request(&PortalRequest::from_query(query))
    }

    fn commit(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        self.record = *session.record();
        self.fields.apply(session.dynamic_values());
        self.record_status = if self.record.is_complete() {
            RecordStatus::Complete
        } else {
            RecordStatus::Incomplete
        };

        match self.store.save_all(&self.record, &self.fields) {
            Ok(()) => info!("provisioning: config committed"),
            Err(e) => error!("provisioning: committing config failed ({})", e),
        }

        if self.store.portal_flag().is_set() {
            if let Err(e) = self.store.clear_portal_flag() {
                warn!("provisioning: clearing portal flag failed ({})", e);
            }
        }

        let now = self.board.now_ms();
        self.restart_at = Some(now + u64::from(self.config.restart_delay_ms));
        info!("provisioning: restart in {} ms", self.config.restart_delay_ms);
    }

    fn enter_config_mode(&mut self, reason: PortalReason, with_deadline: bool) {
        let now = self.board.now_ms();
        let access_point = self.config.access_point.resolve(self.board.chip_id(), now);
        info!(
            "provisioning: config mode ({:?}), ap {} channel {}",
            reason,
            access_point.ssid.as_str(),
            access_point.channel
        );
        if self.station.start_access_point(&access_point).is_err() {
            error!("provisioning: starting the access point failed");
        }

        self.access_point = Some(access_point);
        self.session = Some(PortalSession::new(self.store.header(), &self.fields));
        self.deadline = with_deadline.then(|| now + u64::from(self.config.config_timeout_ms));
        self.failed_ticks = 0;
        self.portal_reason = Some(reason);
        self.set_state(State::ConfigurationMode);
    }

    fn leave_config_mode(&mut self) {
        self.session = None;
        self.deadline = None;
        self.failed_ticks = 0;
        self.portal_reason = None;
        self.set_state(State::NormalOperation);
    }

    /// Network first, then up to `rounds` rounds over the cloud slots.
    fn connect_stored(&mut self, rounds: u8) -> bool {
        let network = connect_network(
            &mut self.station,
            &mut self.board,
            &self.record.wifi,
            &self.station_config,
            &self.config.connect,
        );
        if !network.is_connected() {
            return false;
        }

        for round in 1..=rounds {
            if self.connect_cloud_round() {
                return true;
            }
            debug!("provisioning: cloud round {} of {} failed", round, rounds);
        }
        false
    }

    fn connect_cloud_round(&mut self) -> bool {
        connect_cloud_link(
            &mut self.link,
            &self.record.cloud,
            self.record.port,
            self.config.connect.cloud_timeout_ms,
        )
        .is_connected()
    }

    fn restart(&mut self) {
        info!("provisioning: restarting");
        self.set_state(State::Rebooting);
        self.board.restart();
    }

    fn set_state(&mut self, state: State) {
        if self.state != state {
            debug!("provisioning: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn portal_in_use(&self) -> bool {
        self.session.as_ref().is_some_and(PortalSession::is_in_use)
    }

    fn title(&self) -> &str {
        if !self.station_config.hostname.is_empty() {
            self.station_config.hostname.as_str()
        } else {
            self.record.board_name.as_str()
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_configuration_mode(&self) -> bool {
        self.state == State::ConfigurationMode
    }

    pub fn portal_reason(&self) -> Option<PortalReason> {
        self.portal_reason
    }

    pub fn record_status(&self) -> RecordStatus {
        self.record_status
    }

    /// Uptime at which config mode gives up waiting, `None` while it waits indefinitely.
    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    pub fn session(&self) -> Option<&PortalSession> {
        self.session.as_ref()
    }

    pub fn access_point(&self) -> Option<&AccessPoint> {
        self.access_point.as_ref()
    }

    pub fn hostname(&self) -> &str {
        self.station_config.hostname.as_str()
    }

    pub fn config(&self) -> &ConfigRecord {
        &self.record
    }

    pub fn settings(&self) -> &ProvisioningConfig {
        &self.config
    }

    pub fn wifi_ssid(&self, slot: usize) -> Result<&str, Error> {
        Ok(self.wifi_slot(slot)?.ssid.as_str())
    }

    pub fn wifi_password(&self, slot: usize) -> Result<&str, Error> {
        Ok(self.wifi_slot(slot)?.password.as_str())
    }

    pub fn server(&self, slot: usize) -> Result<&str, Error> {
        Ok(self.cloud_slot(slot)?.server.as_str())
    }

    pub fn token(&self, slot: usize) -> Result<&str, Error> {
        Ok(self.cloud_slot(slot)?.token.as_str())
    }

    fn wifi_slot(&self, slot: usize) -> Result<&WifiCredential, Error> {
        self.record.wifi.get(slot).ok_or(Error::SlotOutOfRange)
    }

    fn cloud_slot(&self, slot: usize) -> Result<&CloudCredential, Error> {
        self.record.cloud.get(slot).ok_or(Error::SlotOutOfRange)
    }

    pub fn board_name(&self) -> &str {
        self.record.board_name.as_str()
    }

    pub fn port(&self) -> u16 {
        self.record.port
    }

    pub fn dynamic_value(&self, id: &str) -> Option<&str> {
        self.fields.find(id).map(|f| f.value())
    }

    pub fn dynamic_fields(&self) -> &DynamicFields<'a> {
        &self.fields
    }

    /// Changes a network slot in memory. Persist with [`save_config`](Self::save_config).
    pub fn set_wifi_credential(
        &mut self,
        slot: usize,
        ssid: &str,
        password: &str,
    ) -> Result<(), Error> {
        if slot >= NUM_WIFI_CREDENTIALS {
            return Err(Error::SlotOutOfRange);
        }
        self.record.wifi[slot] = WifiCredential::new(ssid, password);
        Ok(())
    }

    /// Changes a cloud slot in memory. Persist with [`save_config`](Self::save_config).
    pub fn set_cloud_credential(
        &mut self,
        slot: usize,
        server: &str,
        token: &str,
    ) -> Result<(), Error> {
        if slot >= NUM_CLOUD_CREDENTIALS {
            return Err(Error::SlotOutOfRange);
        }
        self.record.cloud[slot] = CloudCredential::new(server, token);
        Ok(())
    }

    pub fn set_token(&mut self, slot: usize, token: &str) -> Result<(), Error> {
        if slot >= NUM_CLOUD_CREDENTIALS {
            return Err(Error::SlotOutOfRange);
        }
        self.record.cloud[slot].token = AuthToken::truncating(token);
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) {
        self.record.port = port;
    }

    pub fn set_board_name(&mut self, name: &str) {
        self.record.board_name = BoardName::truncating(name);
    }

    pub fn set_dynamic_value(&mut self, id: &str, value: &str) -> Result<(), Error> {
        let field = self.fields.find_mut(id).ok_or(Error::NotFound)?;
        field.set(value);
        Ok(())
    }

    /// Persists the in-memory record and dynamic fields.
    pub fn save_config(&mut self) -> Result<(), Error> {
        self.store.save_all(&self.record, &self.fields)
    }

    /// Replaces the stored config by the blank record, the next boot opens the portal.
    pub fn clear_config(&mut self) -> Result<(), Error> {
        info!("provisioning: clearing config");
        self.record = ConfigRecord::blank(self.store.header());
        self.record_status = RecordStatus::Incomplete;
        self.fields.set_blank();
        self.store.save_all(&self.record, &self.fields)
    }

    /// Sets the one-shot portal flag and restarts.
    pub fn reset_and_enter_config_portal(&mut self) -> Result<(), Error> {
        self.store.set_portal_flag(false)?;
        self.restart();
        Ok(())
    }

    /// Sets the portal flag that survives restarts until a portal session commits, and restarts.
    pub fn reset_and_enter_config_portal_persistent(&mut self) -> Result<(), Error> {
        self.store.set_portal_flag(true)?;
        self.restart();
        Ok(())
    }

    pub fn station_mut(&mut self) -> &mut W {
        &mut self.station
    }

    pub fn cloud_link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn detector_mut(&mut self) -> &mut R {
        &mut self.detector
    }

    pub fn store_mut(&mut self) -> &mut RecordStore<S> {
        &mut self.store
    }

    /// Tears the manager down and hands back the medium, e.g. to simulate a restart.
    pub fn into_storage(self) -> S {
        self.store.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portal(reason: PortalReason, deadline: bool) -> BootDecision {
        BootDecision::Portal { reason, deadline }
    }

    #[test]
    fn complete_record_connects() {
        assert_eq!(
            decide_boot(RecordStatus::Complete, false, PortalFlag::Normal),
            BootDecision::Connect
        );
    }

    #[test]
    fn incomplete_record_always_opens_portal() {
        for burst in [false, true] {
            for status in [RecordStatus::Incomplete, RecordStatus::Unavailable] {
                assert_eq!(
                    decide_boot(status, burst, PortalFlag::Normal),
                    portal(PortalReason::NoConfigData, false)
                );
            }
        }
    }

    #[test]
    fn reset_burst_sets_deadline() {
        assert_eq!(
            decide_boot(RecordStatus::Complete, true, PortalFlag::Normal),
            portal(PortalReason::ResetBurst, true)
        );
    }

    #[test]
    fn forced_flag_takes_precedence() {
        for status in [
            RecordStatus::Complete,
            RecordStatus::Incomplete,
            RecordStatus::Unavailable,
        ] {
            assert_eq!(
                decide_boot(status, true, PortalFlag::Forced),
                portal(PortalReason::Forced, false)
            );
            assert_eq!(
                decide_boot(status, false, PortalFlag::ForcedPersistent),
                portal(PortalReason::ForcedPersistent, false)
            );
        }
    }
}
