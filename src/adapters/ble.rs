//! BLE GATT server adapter.
//!
//! Implements [`GattPort`] for the configuration service.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server through raw
//!   `esp_idf_svc::sys` calls.  Stack callbacks are C function pointers, so
//!   all state they touch lives in statics; every event of interest becomes
//!   a [`BleInput`] in the BLE inbox.
//! - **all other targets**: an in-memory server that records values,
//!   notifications and radio state for host tests.
//!
//! ## Registration
//!
//! Characteristics are created one at a time in [`AttributeId::ALL`]
//! order: base service, its characteristics, the Azimuth CCCD, then the
//! advanced service and its characteristics.  Each `*_EVT` completion
//! triggers the next step.
//!
//! Reads and writes are answered by this adapter (`ESP_GATT_RSP_BY_APP`)
//! from a value cache that only [`GattPort::set_value`] updates, so a peer
//! never reads back bytes the service has not accepted.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::attributes::AttributeId;
use crate::app::ports::{GattPort, PeerInfo};
use crate::config::{ConnParams, FirmwareConfig};
use crate::error::Error;

/// Largest value served for one attribute.
pub const MAX_VALUE_LEN: usize = 256;

type Value = heapless::Vec<u8, MAX_VALUE_LEN>;

/// Copy `value` into a cache slot, truncating to [`MAX_VALUE_LEN`].
fn store_value(slot: &mut Value, value: &[u8]) -> bool {
    slot.clear();
    let len = value.len().min(MAX_VALUE_LEN);
    // Cannot fail: `len` is within capacity.
    let _ = slot.extend_from_slice(&value[..len]);
    len == value.len()
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF static state
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod stack {
    use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard, PoisonError};

    use super::Value;
    use crate::app::attributes::AttributeId;

    /// Simultaneous centrals tracked for notifications.
    pub const MAX_PEERS: usize = 4;

    pub static GATTS_IF: AtomicU32 = AtomicU32::new(0);
    pub static SERVICE_STEP: AtomicUsize = AtomicUsize::new(0);
    pub static SERVICE_HANDLE: AtomicU16 = AtomicU16::new(0);
    pub static CHAR_STEP: AtomicUsize = AtomicUsize::new(0);
    pub static CCCD_HANDLE: AtomicU16 = AtomicU16::new(0);
    pub static HANDLES: [AtomicU16; AttributeId::COUNT] =
        [const { AtomicU16::new(0) }; AttributeId::COUNT];

    /// Advertising data and scan response both configured.
    pub static ADV_DATA_PENDING: AtomicU32 = AtomicU32::new(0);
    pub static ADV_WANTED: AtomicBool = AtomicBool::new(false);

    pub static VALUES: Mutex<[Value; AttributeId::COUNT]> =
        Mutex::new([const { heapless::Vec::new() }; AttributeId::COUNT]);
    /// Connection ids with notifications enabled on Azimuth.
    pub static SUBSCRIBERS: Mutex<heapless::Vec<u16, MAX_PEERS>> =
        Mutex::new(heapless::Vec::new());

    pub fn values() -> MutexGuard<'static, [Value; AttributeId::COUNT]> {
        VALUES.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribers() -> MutexGuard<'static, heapless::Vec<u16, MAX_PEERS>> {
        SUBSCRIBERS.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn gatts_if() -> u8 {
        GATTS_IF.load(Ordering::Relaxed) as u8
    }

    pub fn attr_for_handle(handle: u16) -> Option<AttributeId> {
        if handle == 0 {
            return None;
        }
        AttributeId::ALL
            .into_iter()
            .find(|a| HANDLES[a.index()].load(Ordering::Relaxed) == handle)
    }

    pub fn handle_for(attr: AttributeId) -> u16 {
        HANDLES[attr.index()].load(Ordering::Relaxed)
    }

    pub fn reset() {
        for h in &HANDLES {
            h.store(0, Ordering::Relaxed);
        }
        CCCD_HANDLE.store(0, Ordering::Relaxed);
        SERVICE_STEP.store(0, Ordering::Relaxed);
        CHAR_STEP.store(0, Ordering::Relaxed);
        ADV_WANTED.store(false, Ordering::Relaxed);
        subscribers().clear();
    }
}

#[cfg(target_os = "espidf")]
mod callbacks {
    use core::sync::atomic::Ordering;

    use esp_idf_svc::sys::*;
    use log::{debug, info, warn};

    use super::stack::{self, ADV_DATA_PENDING, ADV_WANTED, CCCD_HANDLE, CHAR_STEP};
    use crate::app::attributes::{AttributeId, Service};
    use crate::app::ble_service::{BleInput, MAX_WRITE_LEN};
    use crate::app::ports::PeerInfo;
    use crate::inbox::post_ble;

    const ADV_DATA_BIT: u32 = 1;
    const SCAN_RSP_BIT: u32 = 2;

    /// Attribute handles needed per service: declaration, two per
    /// characteristic, one CCCD.
    const fn handle_count(service: Service) -> u16 {
        let mut n = 1;
        let mut i = 0;
        while i < AttributeId::COUNT {
            let a = AttributeId::ALL[i];
            if matches!(
                (a.service(), service),
                (Service::Base, Service::Base) | (Service::Advanced, Service::Advanced)
            ) {
                n += 2;
                if a.access().notify {
                    n += 1;
                }
            }
            i += 1;
        }
        n
    }

    pub fn uuid128_to_esp(uuid: u128) -> esp_bt_uuid_t {
        let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        t.len = ESP_UUID_LEN_128 as u16;
        t.uuid.uuid128 = uuid.to_le_bytes();
        t
    }

    fn uuid16_to_esp(uuid: u16) -> esp_bt_uuid_t {
        let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        t.len = ESP_UUID_LEN_16 as u16;
        t.uuid.uuid16 = uuid;
        t
    }

    pub fn adv_params() -> esp_ble_adv_params_t {
        esp_ble_adv_params_t {
            adv_int_min: 0x20,
            adv_int_max: 0x40,
            adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
            adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
            ..unsafe { core::mem::zeroed() }
        }
    }

    fn create_service(gatts_if: esp_gatt_if_t, service: Service) {
        let mut svc_id = esp_gatt_srvc_id_t {
            id: esp_gatt_id_t {
                uuid: uuid128_to_esp(service.uuid()),
                inst_id: 0,
            },
            is_primary: true,
        };
        unsafe { esp_ble_gatts_create_service(gatts_if, &mut svc_id, handle_count(service)) };
    }

    fn current_service() -> Service {
        if stack::SERVICE_STEP.load(Ordering::Relaxed) == 0 {
            Service::Base
        } else {
            Service::Advanced
        }
    }

    fn add_char(svc_handle: u16, attr: AttributeId) {
        let access = attr.access();
        let mut perm = 0u32;
        let mut prop = 0u32;
        if access.read {
            perm |= ESP_GATT_PERM_READ;
            prop |= ESP_GATT_CHAR_PROP_BIT_READ;
        }
        if access.write {
            perm |= ESP_GATT_PERM_WRITE;
            prop |= ESP_GATT_CHAR_PROP_BIT_WRITE;
        }
        if access.notify {
            prop |= ESP_GATT_CHAR_PROP_BIT_NOTIFY;
        }
        let mut uuid = uuid128_to_esp(attr.uuid());
        unsafe {
            esp_ble_gatts_add_char(
                svc_handle,
                &mut uuid,
                perm as esp_gatt_perm_t,
                prop as esp_gatt_char_prop_t,
                core::ptr::null_mut(),
                core::ptr::null_mut(),
            );
        }
    }

    fn add_cccd(svc_handle: u16) {
        let mut uuid = uuid16_to_esp(ESP_GATT_UUID_CHAR_CLIENT_CONFIG as u16);
        unsafe {
            esp_ble_gatts_add_char_descr(
                svc_handle,
                &mut uuid,
                (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                core::ptr::null_mut(),
                core::ptr::null_mut(),
            );
        }
    }

    /// Add the next characteristic of the current service, or move on to
    /// the next service.
    fn register_next(gatts_if: esp_gatt_if_t) {
        let idx = CHAR_STEP.load(Ordering::Relaxed);
        let service = current_service();
        let svc_handle = stack::SERVICE_HANDLE.load(Ordering::Relaxed);

        match AttributeId::ALL.get(idx) {
            Some(&attr) if attr.service() == service => add_char(svc_handle, attr),
            Some(_) => {
                stack::SERVICE_STEP.store(1, Ordering::Relaxed);
                create_service(gatts_if, Service::Advanced);
            }
            None => info!("BLE: attribute table registered"),
        }
    }

    fn configure_adv_data(service: Service, scan_rsp: bool) {
        let mut uuid = service.uuid().to_le_bytes();
        let mut data = esp_ble_adv_data_t {
            set_scan_rsp: scan_rsp,
            include_name: !scan_rsp,
            include_txpower: false,
            min_interval: 0x0006,
            max_interval: 0x0010,
            appearance: 0,
            manufacturer_len: 0,
            p_manufacturer_data: core::ptr::null_mut(),
            service_data_len: 0,
            p_service_data: core::ptr::null_mut(),
            service_uuid_len: uuid.len() as u16,
            p_service_uuid: uuid.as_mut_ptr(),
            flag: (ESP_BLE_ADV_FLAG_GEN_DISC | ESP_BLE_ADV_FLAG_BREDR_NOT_SPT) as u8,
        };
        // The stack deep-copies the payload before returning.
        unsafe { esp_ble_gap_config_adv_data(&mut data) };
    }

    fn respond(conn_id: u16, trans_id: u32, status: esp_gatt_status_t, rsp: *mut esp_gatt_rsp_t) {
        unsafe { esp_ble_gatts_send_response(stack::gatts_if(), conn_id, trans_id, status, rsp) };
    }

    fn respond_read(handle: u16, offset: u16, value: &[u8], conn_id: u16, trans_id: u32) {
        let offset = usize::from(offset);
        if offset > value.len() {
            respond(conn_id, trans_id, esp_gatt_status_t_ESP_GATT_INVALID_OFFSET, core::ptr::null_mut());
            return;
        }
        let mut rsp: esp_gatt_rsp_t = unsafe { core::mem::zeroed() };
        let chunk = &value[offset..];
        unsafe {
            let len = chunk.len().min(rsp.attr_value.value.len());
            rsp.attr_value.handle = handle;
            rsp.attr_value.offset = offset as u16;
            rsp.attr_value.len = len as u16;
            rsp.attr_value.value[..len].copy_from_slice(&chunk[..len]);
        }
        respond(conn_id, trans_id, esp_gatt_status_t_ESP_GATT_OK, &mut rsp);
    }

    fn on_cccd_write(conn_id: u16, data: &[u8]) {
        let value = match data {
            [lo, hi] => u16::from_le_bytes([*lo, *hi]),
            _ => {
                warn!("BLE: malformed CCCD write ({} bytes)", data.len());
                return;
            }
        };
        {
            let mut subs = stack::subscribers();
            subs.retain(|c| *c != conn_id);
            if value & 0x0001 != 0 && subs.push(conn_id).is_err() {
                warn!("BLE: subscriber table full, conn {} not notified", conn_id);
            }
        }
        post_ble(BleInput::Subscribed {
            conn_id,
            attr: AttributeId::Azimuth,
            value,
        });
    }

    pub unsafe extern "C" fn gap_event_handler(
        event: esp_gap_ble_cb_event_t,
        param: *mut esp_ble_gap_cb_param_t,
    ) {
        match event {
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_SET_COMPLETE_EVT
            | esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_RSP_DATA_SET_COMPLETE_EVT => {
                let bit = if event == esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_SET_COMPLETE_EVT {
                    ADV_DATA_BIT
                } else {
                    SCAN_RSP_BIT
                };
                let left = ADV_DATA_PENDING.fetch_and(!bit, Ordering::AcqRel) & !bit;
                if left == 0 && ADV_WANTED.load(Ordering::Acquire) {
                    let mut params = adv_params();
                    unsafe { esp_ble_gap_start_advertising(&mut params) };
                }
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
                let status = unsafe { (*param).adv_start_cmpl.status };
                if status == esp_bt_status_t_ESP_BT_STATUS_SUCCESS {
                    info!("BLE GAP: advertising started");
                } else {
                    warn!("BLE GAP: advertising start failed ({})", status);
                }
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
                info!("BLE GAP: advertising stopped");
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_UPDATE_CONN_PARAMS_EVT => {
                let p = unsafe { &(*param).update_conn_params };
                debug!(
                    "BLE GAP: conn params int={} latency={} timeout={}",
                    p.conn_int, p.latency, p.timeout
                );
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_SEC_REQ_EVT => unsafe {
                esp_ble_gap_security_rsp((*param).ble_security.ble_req.bd_addr.as_mut_ptr(), true);
            },
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_AUTH_CMPL_EVT => {
                let p = unsafe { &(*param).ble_security.auth_cmpl };
                if p.success {
                    info!("BLE GAP: authentication complete (bonded)");
                } else {
                    warn!("BLE GAP: authentication failed (reason={})", p.fail_reason);
                }
            }
            _ => {}
        }
    }

    pub unsafe extern "C" fn gatts_event_handler(
        event: esp_gatts_cb_event_t,
        gatts_if: esp_gatt_if_t,
        param: *mut esp_ble_gatts_cb_param_t,
    ) {
        match event {
            esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
                stack::GATTS_IF.store(u32::from(gatts_if), Ordering::Relaxed);
                info!("BLE GATTS: app registered (if={})", gatts_if);
                ADV_DATA_PENDING.store(ADV_DATA_BIT | SCAN_RSP_BIT, Ordering::Release);
                configure_adv_data(Service::Base, false);
                configure_adv_data(Service::Advanced, true);
                create_service(gatts_if, Service::Base);
            }
            esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
                let svc_handle = unsafe { (*param).create.service_handle };
                stack::SERVICE_HANDLE.store(svc_handle, Ordering::Relaxed);
                info!(
                    "BLE GATTS: {:?} service created (handle={})",
                    current_service(),
                    svc_handle
                );
                unsafe { esp_ble_gatts_start_service(svc_handle) };
                register_next(gatts_if);
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
                let handle = unsafe { (*param).add_char.attr_handle };
                let idx = CHAR_STEP.load(Ordering::Relaxed);
                let Some(&attr) = AttributeId::ALL.get(idx) else {
                    return;
                };
                stack::HANDLES[idx].store(handle, Ordering::Relaxed);
                debug!("BLE GATTS: {} char (handle={})", attr.name(), handle);
                if attr.access().notify {
                    add_cccd(stack::SERVICE_HANDLE.load(Ordering::Relaxed));
                } else {
                    CHAR_STEP.store(idx + 1, Ordering::Relaxed);
                    register_next(gatts_if);
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
                let handle = unsafe { (*param).add_char_descr.attr_handle };
                CCCD_HANDLE.store(handle, Ordering::Relaxed);
                CHAR_STEP.fetch_add(1, Ordering::Relaxed);
                register_next(gatts_if);
            }
            esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
                let p = unsafe { &(*param).connect };
                post_ble(BleInput::Connected(PeerInfo {
                    conn_id: p.conn_id,
                    address: p.remote_bda,
                }));
            }
            esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
                let p = unsafe { &(*param).disconnect };
                stack::subscribers().retain(|c| *c != p.conn_id);
                debug!("BLE GATTS: disconnect reason 0x{:x}", p.reason);
                post_ble(BleInput::Disconnected(PeerInfo {
                    conn_id: p.conn_id,
                    address: p.remote_bda,
                }));
            }
            esp_gatts_cb_event_t_ESP_GATTS_READ_EVT => {
                let p = unsafe { &(*param).read };
                if !p.need_rsp {
                    return;
                }
                if p.handle == CCCD_HANDLE.load(Ordering::Relaxed) {
                    let on = u16::from(stack::subscribers().contains(&p.conn_id));
                    respond_read(p.handle, p.offset, &on.to_le_bytes(), p.conn_id, p.trans_id);
                    return;
                }
                match stack::attr_for_handle(p.handle) {
                    Some(attr) => {
                        let value = stack::values()[attr.index()].clone();
                        respond_read(p.handle, p.offset, &value, p.conn_id, p.trans_id);
                        if p.offset == 0 {
                            post_ble(BleInput::Read(attr));
                        }
                    }
                    None => respond(
                        p.conn_id,
                        p.trans_id,
                        esp_gatt_status_t_ESP_GATT_INVALID_HANDLE,
                        core::ptr::null_mut(),
                    ),
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
                let p = unsafe { &(*param).write };
                let data = unsafe { core::slice::from_raw_parts(p.value, usize::from(p.len)) };

                let status = if p.is_prep {
                    esp_gatt_status_t_ESP_GATT_REQ_NOT_SUPPORTED
                } else if p.handle == CCCD_HANDLE.load(Ordering::Relaxed) {
                    on_cccd_write(p.conn_id, data);
                    esp_gatt_status_t_ESP_GATT_OK
                } else if let Some(attr) = stack::attr_for_handle(p.handle) {
                    match heapless::Vec::<u8, MAX_WRITE_LEN>::from_slice(data) {
                        Ok(data) => {
                            if !post_ble(BleInput::Write { attr, data }) {
                                warn!("BLE: {} write lost", attr.name());
                            }
                            esp_gatt_status_t_ESP_GATT_OK
                        }
                        Err(()) => esp_gatt_status_t_ESP_GATT_INVALID_ATTR_LEN,
                    }
                } else {
                    esp_gatt_status_t_ESP_GATT_INVALID_HANDLE
                };

                if p.need_rsp {
                    respond(p.conn_id, p.trans_id, status, core::ptr::null_mut());
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_MTU_EVT => {
                let p = unsafe { &(*param).mtu };
                post_ble(BleInput::MtuChanged {
                    conn_id: p.conn_id,
                    mtu: p.mtu,
                });
            }
            esp_gatts_cb_event_t_ESP_GATTS_CONF_EVT => {
                let status = unsafe { (*param).conf.status };
                post_ble(BleInput::NotifyStatus(status as i32));
            }
            _ => {}
        }
    }
}

// ───────────────────────────────────────────────────────────────
// GATT server
// ───────────────────────────────────────────────────────────────

pub struct GattServer {
    device_name: heapless::String<16>,
    running: bool,
    #[cfg(not(target_os = "espidf"))]
    sim: SimState,
}

/// What the host build records instead of talking to a radio.
#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
pub struct SimState {
    pub values: [Value; AttributeId::COUNT],
    pub notifications: Vec<(AttributeId, Vec<u8>)>,
    pub conn_updates: Vec<(u16, ConnParams)>,
    pub advertising_starts: u32,
}

impl GattServer {
    /// Bring up the controller and host stack and register the attribute
    /// table.  Registration completes asynchronously on the stack task.
    pub fn start(config: &FirmwareConfig) -> Result<Self, Error> {
        let mut server = Self {
            device_name: config.device_name.clone(),
            running: false,
            #[cfg(not(target_os = "espidf"))]
            sim: SimState::default(),
        };
        server.platform_start(config)?;
        server.running = true;
        Ok(server)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim(&self) -> &SimState {
        &self.sim
    }

    /// Current cached value of `attr`.
    #[cfg(not(target_os = "espidf"))]
    pub fn value(&self, attr: AttributeId) -> &[u8] {
        &self.sim.values[attr.index()]
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self, config: &FirmwareConfig) -> Result<(), Error> {
        use crate::error::BleFault;
        use esp_idf_svc::sys::*;

        let ok = ESP_OK as esp_err_t;
        stack::reset();

        unsafe {
            // BLE-only: hand classic BT memory back to the heap.
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            let ret = esp_bt_controller_init(&mut bt_cfg);
            if ret != ok {
                return Err(BleFault::ControllerInit(ret).into());
            }
            let ret = esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE);
            if ret != ok {
                return Err(BleFault::ControllerEnable(ret).into());
            }
            let ret = esp_bluedroid_init();
            if ret != ok {
                return Err(BleFault::BluedroidInit(ret).into());
            }
            let ret = esp_bluedroid_enable();
            if ret != ok {
                return Err(BleFault::BluedroidEnable(ret).into());
            }

            esp_ble_gap_register_callback(Some(callbacks::gap_event_handler));
            esp_ble_gatts_register_callback(Some(callbacks::gatts_event_handler));

            // Just-works pairing with Secure Connections and bonding.
            let auth_req = esp_ble_auth_req_t_ESP_LE_AUTH_REQ_SC_BOND;
            let iocap = esp_ble_io_cap_t_ESP_IO_CAP_NONE;
            let key_size: u8 = 16;
            let init_key: u8 = (ESP_BLE_ENC_KEY_MASK | ESP_BLE_ID_KEY_MASK) as u8;
            let rsp_key: u8 = (ESP_BLE_ENC_KEY_MASK | ESP_BLE_ID_KEY_MASK) as u8;
            esp_ble_gap_set_security_param(
                esp_ble_sm_param_t_ESP_BLE_SM_AUTHEN_REQ_MODE,
                &auth_req as *const _ as *mut _,
                core::mem::size_of_val(&auth_req) as u8,
            );
            esp_ble_gap_set_security_param(
                esp_ble_sm_param_t_ESP_BLE_SM_IOCAP_MODE,
                &iocap as *const _ as *mut _,
                core::mem::size_of_val(&iocap) as u8,
            );
            esp_ble_gap_set_security_param(
                esp_ble_sm_param_t_ESP_BLE_SM_MAX_KEY_SIZE,
                &key_size as *const _ as *mut _,
                1,
            );
            esp_ble_gap_set_security_param(
                esp_ble_sm_param_t_ESP_BLE_SM_SET_INIT_KEY,
                &init_key as *const _ as *mut _,
                1,
            );
            esp_ble_gap_set_security_param(
                esp_ble_sm_param_t_ESP_BLE_SM_SET_RSP_KEY,
                &rsp_key as *const _ as *mut _,
                1,
            );

            let mut name = [0u8; 17];
            let bytes = self.device_name.as_bytes();
            name[..bytes.len()].copy_from_slice(bytes);
            esp_ble_gap_set_device_name(name.as_ptr().cast());

            let ret = esp_ble_gatt_set_local_mtu(config.ble_mtu);
            if ret != ok {
                warn!("BLE: set_local_mtu({}) failed ({})", config.ble_mtu, ret);
            }

            let ret = esp_ble_gatts_app_register(0);
            if ret != ok {
                return Err(BleFault::Register(ret).into());
            }
        }

        info!(
            "BLE(espidf): Bluedroid stack initialised as '{}' (MTU {})",
            self.device_name, config.ble_mtu
        );
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self, config: &FirmwareConfig) -> Result<(), Error> {
        info!(
            "BLE(sim): GATT server '{}' (MTU {})",
            self.device_name, config.ble_mtu
        );
        Ok(())
    }
}

impl GattPort for GattServer {
    #[cfg(target_os = "espidf")]
    fn set_value(&mut self, attr: AttributeId, value: &[u8]) {
        if !store_value(&mut stack::values()[attr.index()], value) {
            warn!("BLE: {} value truncated to {} bytes", attr.name(), MAX_VALUE_LEN);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn set_value(&mut self, attr: AttributeId, value: &[u8]) {
        store_value(&mut self.sim.values[attr.index()], value);
    }

    #[cfg(target_os = "espidf")]
    fn notify(&mut self, attr: AttributeId) {
        use esp_idf_svc::sys::esp_ble_gatts_send_indicate;

        let handle = stack::handle_for(attr);
        if handle == 0 || !self.running {
            return;
        }
        let mut value = stack::values()[attr.index()].clone();
        let peers = stack::subscribers().clone();
        for conn_id in peers {
            unsafe {
                esp_ble_gatts_send_indicate(
                    stack::gatts_if(),
                    conn_id,
                    handle,
                    value.len() as u16,
                    value.as_mut_ptr(),
                    false,
                );
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn notify(&mut self, attr: AttributeId) {
        if self.running {
            let value = self.sim.values[attr.index()].to_vec();
            self.sim.notifications.push((attr, value));
        }
    }

    #[cfg(target_os = "espidf")]
    fn update_conn_params(&mut self, peer: &PeerInfo, params: &ConnParams) {
        use esp_idf_svc::sys::*;

        let mut update = esp_ble_conn_update_params_t {
            bda: peer.address,
            min_int: params.min_interval,
            max_int: params.max_interval,
            latency: params.latency,
            timeout: params.timeout,
        };
        let ret = unsafe { esp_ble_gap_update_conn_params(&mut update) };
        if ret != ESP_OK as esp_err_t {
            warn!("BLE: conn param update for conn {} failed ({})", peer.conn_id, ret);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn update_conn_params(&mut self, peer: &PeerInfo, params: &ConnParams) {
        self.sim.conn_updates.push((peer.conn_id, *params));
    }

    #[cfg(target_os = "espidf")]
    fn start_advertising(&mut self) {
        use core::sync::atomic::Ordering;

        if !self.running {
            return;
        }
        stack::ADV_WANTED.store(true, Ordering::Release);
        // Otherwise the GAP handler starts once the adv data is configured.
        if stack::ADV_DATA_PENDING.load(Ordering::Acquire) == 0 {
            let mut params = callbacks::adv_params();
            unsafe { esp_idf_svc::sys::esp_ble_gap_start_advertising(&mut params) };
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn start_advertising(&mut self) {
        if self.running {
            self.sim.advertising_starts += 1;
        }
    }

    #[cfg(target_os = "espidf")]
    fn shutdown(&mut self) {
        use esp_idf_svc::sys::*;

        if !self.running {
            return;
        }
        unsafe {
            esp_ble_gap_stop_advertising();
            esp_bluedroid_disable();
            esp_bluedroid_deinit();
            esp_bt_controller_disable();
            esp_bt_controller_deinit();
        }
        stack::reset();
        self.running = false;
        info!("BLE(espidf): stack shut down");
    }

    #[cfg(not(target_os = "espidf"))]
    fn shutdown(&mut self) {
        self.running = false;
        info!("BLE(sim): stopped");
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
