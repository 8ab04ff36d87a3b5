//! Protobuf messages and tonic stubs for the services the roster importer talks to.
//!
//! Generated at build time from `proto/`. Servers are generated too, so tests can stand
//! up in-process fakes of both services.

pub mod bob {
    pub mod v1 {
        tonic::include_proto!("bob.v1");
    }
}

pub mod usermgmt {
    pub mod v2 {
        tonic::include_proto!("usermgmt.v2");
    }
}
