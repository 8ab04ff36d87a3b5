use roster_proto::usermgmt::v2::ImportWithusManagaraBaseCsvRequest;

use crate::fetcher::FilePayload;

/// Transport envelope accepted by the import service.
pub type ImportRequest = ImportWithusManagaraBaseCsvRequest;

/// Wrap fetched bytes as-is. Encoding and schema are the import service's problem.
pub fn build(file: FilePayload) -> ImportRequest {
    ImportRequest {
        payload: Vec::from(file.bytes),
    }
}
