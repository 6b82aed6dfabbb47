//! Shared domain enums
//!
//! Source platforms and storage providers recognized by the ingestion
//! pipeline. Both enums serialize as lowercase strings, matching the values
//! stored in the jobs table and accepted by the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::error::CommonError;

/// Review source platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Agoda,
    Booking,
    Expedia,
    Hotels,
    Tripadvisor,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Agoda => "agoda",
            Platform::Booking => "booking",
            Platform::Expedia => "expedia",
            Platform::Hotels => "hotels",
            Platform::Tripadvisor => "tripadvisor",
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = CommonError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "agoda" => Ok(Platform::Agoda),
            "booking" => Ok(Platform::Booking),
            "expedia" => Ok(Platform::Expedia),
            "hotels" => Ok(Platform::Hotels),
            "tripadvisor" => Ok(Platform::Tripadvisor),
            other => Err(CommonError::UnknownPlatform(other.to_string())),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage backend a source file lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Local,
    S3,
}

impl StorageProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageProvider::Local => "local",
            StorageProvider::S3 => "s3",
        }
    }
}

impl std::str::FromStr for StorageProvider {
    type Err = CommonError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(StorageProvider::Local),
            "s3" => Ok(StorageProvider::S3),
            other => Err(CommonError::UnknownStorageProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
