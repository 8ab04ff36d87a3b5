use std::sync::Arc;

use bytes::Bytes;
use chrono::{Local, NaiveDate, Utc};
use chrono_tz::Tz;
use common_s3::{S3Client, S3Error};
use tracing::debug;

use crate::error::FetchError;
use crate::object_name::{ObjectNaming, Organization};

/// Source of "today" for object naming.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Wall clock, in the configured zone or the host's local zone.
pub struct SystemClock {
    zone: Option<Tz>,
}

impl SystemClock {
    pub fn new(zone: Option<Tz>) -> Self {
        Self { zone }
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        match self.zone {
            Some(zone) => Utc::now().with_timezone(&zone).date_naive(),
            None => Local::now().date_naive(),
        }
    }
}

/// Raw bytes of a fetched export, with the name they were fetched under.
#[derive(Debug, Clone)]
pub struct FilePayload {
    pub object_name: String,
    pub bytes: Bytes,
}

pub struct ObjectFetcher {
    client: Arc<dyn S3Client>,
    bucket: String,
    naming: ObjectNaming,
    clock: Arc<dyn Clock>,
}

impl ObjectFetcher {
    pub fn new(
        client: Arc<dyn S3Client>,
        bucket: impl Into<String>,
        naming: ObjectNaming,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            naming,
            clock,
        }
    }

    pub fn object_name(&self, organization: Organization) -> String {
        self.naming.object_name(organization, self.clock.today())
    }

    /// Fetch today's export for `organization`. No retry here.
    pub async fn fetch(&self, organization: Organization) -> Result<FilePayload, FetchError> {
        self.fetch_object(self.object_name(organization)).await
    }

    /// Fetch an already-resolved object name.
    pub async fn fetch_object(&self, object_name: String) -> Result<FilePayload, FetchError> {
        debug!(bucket = %self.bucket, object_name, "fetching export");

        match self.client.get_object(&self.bucket, &object_name).await {
            Ok(bytes) => Ok(FilePayload { object_name, bytes }),
            Err(S3Error::NotFound(_)) => Err(FetchError::NotFound {
                bucket: self.bucket.clone(),
                object_name,
            }),
            Err(S3Error::OperationFailed(message)) => Err(FetchError::Transient {
                object_name,
                message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use common_s3::MockS3Client;

    use super::*;
    use crate::test_utils::FixedClock;

    const BUCKET: &str = "exports";

    fn fetcher(client: MockS3Client, date: NaiveDate) -> ObjectFetcher {
        ObjectFetcher::new(
            Arc::new(client),
            BUCKET,
            ObjectNaming::default(),
            Arc::new(FixedClock(date)),
        )
    }

    fn may_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[tokio::test]
    async fn test_fetches_todays_object() {
        let client = MockS3Client::new().get_object_ret(
            BUCKET,
            "/withus/W2-D6L_users20240501.tsv",
            Ok(Bytes::from_static(b"a\tb\n1\t2\n")),
        );

        let payload = fetcher(client, may_first())
            .fetch(Organization::ManagaraBase)
            .await
            .unwrap();

        assert_eq!(payload.object_name, "/withus/W2-D6L_users20240501.tsv");
        assert_eq!(&payload.bytes[..], b"a\tb\n1\t2\n");
    }

    #[tokio::test]
    async fn test_same_day_fetches_same_name() {
        let client = MockS3Client::new();
        let fetcher = fetcher(client.clone(), may_first());

        drop(fetcher.fetch(Organization::ManagaraHighSchool).await);
        drop(fetcher.fetch(Organization::ManagaraHighSchool).await);

        let requested = client.requested();
        assert_eq!(requested.len(), 2);
        assert_eq!(requested[0], requested[1]);
        assert_eq!(requested[0], "exports:/itee/N1-M1_users20240501.tsv");
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let err = fetcher(MockS3Client::new(), may_first())
            .fetch(Organization::ManagaraBase)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::NotFound { .. }));
        assert_eq!(err.object_name(), "/withus/W2-D6L_users20240501.tsv");
    }

    #[tokio::test]
    async fn test_storage_failure_is_transient() {
        let client = MockS3Client::new().get_object_ret(
            BUCKET,
            "/withus/W2-D6L_users20240501.tsv",
            Err(S3Error::OperationFailed("503 SlowDown".to_string())),
        );

        let err = fetcher(client, may_first())
            .fetch(Organization::ManagaraBase)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Transient { ref message, .. } if message == "503 SlowDown"));
    }

    #[test]
    fn test_system_clock_zone() {
        // Whatever the host zone is, Tokyo and UTC are never more than a day apart.
        let tokyo = SystemClock::new(Some(chrono_tz::Asia::Tokyo)).today();
        let utc = SystemClock::new(Some(chrono_tz::UTC)).today();
        let diff = (tokyo - utc).num_days();
        assert!((0..=1).contains(&diff));
    }
}
