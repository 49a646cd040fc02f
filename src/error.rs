use std::fmt::{Debug, Display};
use std::io::Error as IoError;

use actix_web::body::BoxBody;
use actix_web::error::{JsonPayloadError, PathError, QueryPayloadError};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use derivative::Derivative;
use mongodb::bson::de::Error as BsonDeError;
use mongodb::bson::ser::Error as BsonError;
use mongodb::error::Error as DatabaseError;
use serde::{Serialize, Serializer};

use crate::boost::{BoostEvent, BoostId, BoostStatus};
use crate::provider::ProviderId;

#[derive(Debug, Serialize, Derivative)]
#[derivative(PartialEq)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum Error {
    // 400
    #[serde(serialize_with = "display")]
    InvalidJson(#[derivative(PartialEq = "ignore")] JsonPayloadError),
    #[serde(serialize_with = "display")]
    InvalidPath(#[derivative(PartialEq = "ignore")] PathError),
    #[serde(serialize_with = "display")]
    InvalidQuery(#[derivative(PartialEq = "ignore")] QueryPayloadError),
    InvalidDuration {
        duration_days: i32,
        maximum: i32,
    },
    InvalidStartDate {
        start_date: DateTime<Utc>,
        duration_days: i32,
    },
    NegativeDailyCost {
        #[serde(serialize_with = "display")]
        daily_cost: rust_decimal::Decimal,
    },
    NoCategories,
    MissingReason {
        boost_id: BoostId,
    },
    InvalidPagination {
        page: u64,
        limit: u64,
    },
    InvalidSort {
        sort: String,
    },
    InvalidStatusFilter {
        status: String,
    },

    // 401
    MissingAdminIdentity,

    // 404
    PathDoesNotExist,
    BoostNotFound {
        boost_id: BoostId,
    },
    ProviderNotFound {
        provider_id: ProviderId,
    },

    // 409
    ConcurrentModificationDetected,
    InvalidTransition {
        boost_id: BoostId,
        status: BoostStatus,
        event: BoostEvent,
    },
    BoostHasNotEnded {
        boost_id: BoostId,
        end_date: Option<DateTime<Utc>>,
    },
    ProviderAlreadyBoosted {
        provider_id: ProviderId,
        boost_id: BoostId,
    },

    // 500
    ExistentialState(String),
    #[serde(serialize_with = "display")]
    FailedToSerializeToBson(#[derivative(PartialEq = "ignore")] BsonError),
    #[serde(serialize_with = "display")]
    FailedToDeserializeBson(#[derivative(PartialEq = "ignore")] BsonDeError),
    #[serde(serialize_with = "display")]
    IoError(#[derivative(PartialEq = "ignore")] IoError),
    InvalidConfig {
        key: &'static str,
        value: String,
    },

    // 503
    #[serde(serialize_with = "display")]
    FailedDatabaseCall(#[derivative(PartialEq = "ignore")] DatabaseError),
}

impl Error {
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidJson(_) => "E4001000",
            Error::InvalidPath(_) => "E4001001",
            Error::InvalidQuery(_) => "E4001003",
            Error::InvalidDuration { .. } => "E4001004",
            Error::InvalidStartDate { .. } => "E4001002",
            Error::NegativeDailyCost { .. } => "E4001005",
            Error::NoCategories => "E4001006",
            Error::MissingReason { .. } => "E4001007",
            Error::InvalidPagination { .. } => "E4001008",
            Error::InvalidSort { .. } => "E4001009",
            Error::InvalidStatusFilter { .. } => "E4001010",
            Error::MissingAdminIdentity => "E4011000",
            Error::PathDoesNotExist => "E4041000",
            Error::BoostNotFound { .. } => "E4041001",
            Error::ProviderNotFound { .. } => "E4041002",
            Error::ConcurrentModificationDetected => "E4091000",
            Error::InvalidTransition { .. } => "E4091001",
            Error::BoostHasNotEnded { .. } => "E4091002",
            Error::ProviderAlreadyBoosted { .. } => "E4091003",
            Error::ExistentialState(_) => "E5001000",
            Error::FailedToSerializeToBson(_) => "E5001002",
            Error::FailedToDeserializeBson(_) => "E5001004",
            Error::IoError(_) => "E5001003",
            Error::InvalidConfig { .. } => "E5001005",
            Error::FailedDatabaseCall(_) => "E5031001",
        }
    }

    pub fn error_message(&self) -> &'static str {
        match self {
            Error::InvalidJson(_) => "The given json could not be parsed",
            Error::InvalidPath(_) => "The given path could not be parsed",
            Error::InvalidQuery(_) => "The given query could not be parsed",
            Error::InvalidDuration { .. } => "The requested duration is out of range",
            Error::InvalidStartDate { .. } => "The requested start date is out of range",
            Error::NegativeDailyCost { .. } => "The daily cost must not be negative",
            Error::NoCategories => "A boost must apply to at least one category",
            Error::MissingReason { .. } => "The requested transition requires a reason",
            Error::InvalidPagination { .. } => "The requested page or limit is out of range",
            Error::InvalidSort { .. } => "The requested sort order is not supported",
            Error::InvalidStatusFilter { .. } => "The requested status filter is not supported",
            Error::MissingAdminIdentity => "The request did not identify an admin",
            Error::PathDoesNotExist => "The requested path was not found",
            Error::BoostNotFound { .. } => "The requested boost was not found",
            Error::ProviderNotFound { .. } => "The requested provider was not found",
            Error::ConcurrentModificationDetected => {
                "The server detected a concurrent modification"
            }
            Error::InvalidTransition { .. } => {
                "The requested transition is not allowed from the boost's current status"
            }
            Error::BoostHasNotEnded { .. } => "The requested boost has not reached its end date",
            Error::ProviderAlreadyBoosted { .. } => {
                "The requested provider already has a pending or active boost"
            }
            Error::ExistentialState(_) => "The server detected an invalid state",
            Error::FailedToSerializeToBson(_) => {
                "An error occurred when serializing an object to bson"
            }
            Error::FailedToDeserializeBson(_) => {
                "An error occurred when deserializing an object from bson"
            }
            Error::IoError(_) => "An error occurred during an I/O operation",
            Error::InvalidConfig { .. } => "The server configuration is invalid",
            Error::FailedDatabaseCall(_) => {
                "An error occurred when communicating with the database"
            }
        }
    }

    /// Whether the error only means another writer resolved the boost first.
    pub fn is_lost_race(&self) -> bool {
        matches!(
            self,
            Error::ConcurrentModificationDetected
                | Error::InvalidTransition { .. }
                | Error::BoostHasNotEnded { .. }
        )
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidJson(_) => StatusCode::BAD_REQUEST,
            Error::InvalidPath(_) => StatusCode::BAD_REQUEST,
            Error::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Error::InvalidDuration { .. } => StatusCode::BAD_REQUEST,
            Error::InvalidStartDate { .. } => StatusCode::BAD_REQUEST,
            Error::NegativeDailyCost { .. } => StatusCode::BAD_REQUEST,
            Error::NoCategories => StatusCode::BAD_REQUEST,
            Error::MissingReason { .. } => StatusCode::BAD_REQUEST,
            Error::InvalidPagination { .. } => StatusCode::BAD_REQUEST,
            Error::InvalidSort { .. } => StatusCode::BAD_REQUEST,
            Error::InvalidStatusFilter { .. } => StatusCode::BAD_REQUEST,
            Error::MissingAdminIdentity => StatusCode::UNAUTHORIZED,
            Error::PathDoesNotExist => StatusCode::NOT_FOUND,
            Error::BoostNotFound { .. } => StatusCode::NOT_FOUND,
            Error::ProviderNotFound { .. } => StatusCode::NOT_FOUND,
            Error::ConcurrentModificationDetected => StatusCode::CONFLICT,
            Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::BoostHasNotEnded { .. } => StatusCode::CONFLICT,
            Error::ProviderAlreadyBoosted { .. } => StatusCode::CONFLICT,
            Error::ExistentialState(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::FailedToSerializeToBson(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::FailedToDeserializeBson(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::InvalidConfig { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::FailedDatabaseCall(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse<BoxBody> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Dummy<'a> {
            error_code: &'static str,
            error_message: &'static str,
            error_meta: &'a Error,
        }

        HttpResponse::build(self.status_code()).json(&Dummy {
            error_code: self.error_code(),
            error_message: self.error_message(),
            error_meta: self,
        })
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        Debug::fmt(self, f)
    }
}

impl From<DatabaseError> for Error {
    fn from(error: DatabaseError) -> Error {
        Error::FailedDatabaseCall(error)
    }
}

impl From<BsonError> for Error {
    fn from(error: BsonError) -> Error {
        Error::FailedToSerializeToBson(error)
    }
}

impl From<BsonDeError> for Error {
    fn from(error: BsonDeError) -> Error {
        Error::FailedToDeserializeBson(error)
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::IoError(error)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidJson(err) => Some(err),
            Error::InvalidPath(err) => Some(err),
            Error::InvalidQuery(err) => Some(err),
            Error::FailedDatabaseCall(err) => Some(err),
            Error::FailedToSerializeToBson(err) => Some(err),
            Error::FailedToDeserializeBson(err) => Some(err),
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

fn display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Display,
    S: Serializer,
{
    serializer.collect_str(value)
}
