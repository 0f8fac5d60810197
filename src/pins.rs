//! GPIO / peripheral pin assignments for the MCompass board (ESP32-C3).
//!
//! Single source of truth: `main` hands these to the HAL drivers rather
//! than hard-coding pin numbers at the call sites.  The pointer LED chain
//! and the I²C sensor bus belong to the display and sensor-fusion
//! components and are configured there.

// ---------------------------------------------------------------------------
// GPS module (ATGM336H)
// ---------------------------------------------------------------------------

/// Digital output: GPS LDO enable, active LOW (LOW = module powered).
pub const GPS_EN_GPIO: i32 = 3;
/// UART1 TX → GPS RX.
pub const GPS_TX_GPIO: i32 = 21;
/// UART1 RX ← GPS TX (NMEA stream).
pub const GPS_RX_GPIO: i32 = 20;
