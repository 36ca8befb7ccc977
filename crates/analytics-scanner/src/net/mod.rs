pub mod client;

pub use client::{
    endpoint, AnalyticsApi, AnalyticsClient, ErrorReport, RegistrationError, REGISTER_API,
    SCANNER_ERROR_API,
};
