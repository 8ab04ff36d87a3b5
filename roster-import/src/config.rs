use std::num::NonZeroU64;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use envconfig::Envconfig;

use crate::credentials::TenantCredential;
use crate::object_name::{ObjectNaming, Organization, OrganizationLayout};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3310")]
    pub port: u16,

    #[envconfig(default = "https://identitytoolkit.googleapis.com")]
    pub identity_url: String,

    pub identity_api_key: String,

    #[envconfig(default = "http://127.0.0.1:5050")]
    pub user_modifier_url: String,

    #[envconfig(default = "http://127.0.0.1:6150")]
    pub import_service_url: String,

    pub s3_bucket: String,

    // Set for GCS interop or MinIO, left empty for AWS proper
    pub s3_endpoint: Option<String>,

    #[envconfig(default = "us-east-1")]
    pub s3_region: String,

    #[envconfig(default = "ManagaraBase")]
    pub organization: Organization,

    #[envconfig(default = "")]
    pub tenant_id: String,

    pub tenant_username: String,

    pub tenant_password: String,

    #[envconfig(default = "withus")]
    pub managara_base_prefix: String,

    #[envconfig(default = "W2-D6L")]
    pub managara_base_code: String,

    #[envconfig(default = "itee")]
    pub managara_hs_prefix: String,

    #[envconfig(default = "N1-M1")]
    pub managara_hs_code: String,

    // IANA name, e.g. Asia/Tokyo. Unset means the host's local zone.
    pub timezone: Option<TimeZoneName>,

    // Zero is rejected at load time, a zero period would panic the scheduler
    #[envconfig(default = "6000")]
    pub tick_interval_secs: NonZeroU64,

    #[envconfig(default = "300")]
    pub tick_timeout_secs: NonZeroU64,

    #[envconfig(default = "30000")]
    pub request_timeout_ms: u64,

    // 0 keeps the token for the life of the process
    #[envconfig(default = "0")]
    pub token_refresh_secs: u64,

    #[envconfig(default = "com.manabie.liz")]
    pub client_pkg: String,

    #[envconfig(default = "1.0.0")]
    pub client_version: String,

    #[envconfig(default = "true")]
    pub run_on_start: bool,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tenant_credential(&self) -> TenantCredential {
        TenantCredential {
            tenant_id: self.tenant_id.clone(),
            username: self.tenant_username.clone(),
            password: self.tenant_password.clone(),
        }
    }

    pub fn object_naming(&self) -> ObjectNaming {
        ObjectNaming {
            managara_base: OrganizationLayout {
                prefix: self.managara_base_prefix.clone(),
                code: self.managara_base_code.clone(),
            },
            managara_high_school: OrganizationLayout {
                prefix: self.managara_hs_prefix.clone(),
                code: self.managara_hs_code.clone(),
            },
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.get())
    }

    pub fn tick_timeout(&self) -> Duration {
        Duration::from_secs(self.tick_timeout_secs.get())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn token_max_age(&self) -> Option<Duration> {
        match self.token_refresh_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn time_zone(&self) -> Option<Tz> {
        self.timezone.as_ref().map(|tz| tz.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TimeZoneName(pub Tz);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseTimeZoneError(pub String);

impl std::fmt::Display for ParseTimeZoneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown time zone: {}", self.0)
    }
}

impl FromStr for TimeZoneName {
    type Err = ParseTimeZoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Tz>()
            .map(TimeZoneName)
            .map_err(|_| ParseTimeZoneError(s.to_owned()))
    }
}
