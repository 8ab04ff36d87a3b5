pub const TICKS: &str = "roster_import_ticks_total";
pub const TICK_DURATION: &str = "roster_import_tick_duration_ms";
pub const PAYLOAD_BYTES: &str = "roster_import_payload_bytes";
pub const TOKEN_EXCHANGES: &str = "roster_import_token_exchanges_total";
