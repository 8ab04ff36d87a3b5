use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

/// School systems whose daily user export we import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Organization {
    ManagaraBase,
    ManagaraHighSchool,
}

impl Organization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Organization::ManagaraBase => "ManagaraBase",
            Organization::ManagaraHighSchool => "ManagaraHighSchool",
        }
    }
}

impl fmt::Display for Organization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownOrganization(pub String);

impl fmt::Display for UnknownOrganization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported organization: {}", self.0)
    }
}

impl FromStr for Organization {
    type Err = UnknownOrganization;

    // Exact match only, tags come straight from deployment config.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ManagaraBase" => Ok(Organization::ManagaraBase),
            "ManagaraHighSchool" => Ok(Organization::ManagaraHighSchool),
            _ => Err(UnknownOrganization(s.to_owned())),
        }
    }
}

/// Where one organization's exports live: `/<prefix>/<code>_users<YYYYMMDD>.tsv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationLayout {
    pub prefix: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectNaming {
    pub managara_base: OrganizationLayout,
    pub managara_high_school: OrganizationLayout,
}

impl Default for ObjectNaming {
    fn default() -> Self {
        Self {
            managara_base: OrganizationLayout {
                prefix: "withus".to_string(),
                code: "W2-D6L".to_string(),
            },
            managara_high_school: OrganizationLayout {
                prefix: "itee".to_string(),
                code: "N1-M1".to_string(),
            },
        }
    }
}

impl ObjectNaming {
    pub fn layout(&self, organization: Organization) -> &OrganizationLayout {
        match organization {
            Organization::ManagaraBase => &self.managara_base,
            Organization::ManagaraHighSchool => &self.managara_high_school,
        }
    }

    /// Name of the export for `organization` on `date`. Pure: no clock, no I/O.
    pub fn object_name(&self, organization: Organization, date: NaiveDate) -> String {
        let layout = self.layout(organization);
        format!(
            "/{}/{}_users{}.tsv",
            layout.prefix,
            layout.code,
            date.format("%Y%m%d")
        )
    }
}
