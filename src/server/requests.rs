//! Stored certificate requests.

use std::sync::Mutex;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use crate::api::cert::CertId;
use crate::api::request::{
    CertEnrollmentRequest, CertRequestInfo, CertRequestInfos,
    OperationResult, RequestId, RequestQuery, RequestStatus, RequestType,
};
use crate::commons::{PkiEmptyResult, PkiResult};
use crate::commons::error::Error;
use crate::commons::storage::KeyValueStore;
use crate::config::Config;
use crate::constants::{NS_REQUESTS, REST_BASE};
use crate::server::csr::PKCS10;
use super::policy::PolicyEdit;


//------------ RequestRecord -------------------------------------------------

/// A request as kept by the server.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RequestRecord {
    pub id: RequestId,
    pub request_type: RequestType,
    pub status: RequestStatus,

    /// The submitted request. Empty for revocation requests.
    pub enrollment: CertEnrollmentRequest,

    pub submitter: String,
    pub owner: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub notes: Option<String>,

    /// The nonce handed out by the last review.
    pub nonce: Option<String>,

    pub cert_id: Option<CertId>,
    pub result: OperationResult,
    pub error_message: Option<String>,

    /// Policy attribute values changed by agents.
    #[serde(default)]
    pub edits: Vec<PolicyEdit>,
}

impl RequestRecord {
    pub fn new(
        id: RequestId,
        request_type: RequestType,
        enrollment: CertEnrollmentRequest,
        submitter: &str,
        now: DateTime<Utc>,
    ) -> Self {
        RequestRecord {
            id,
            request_type,
            status: RequestStatus::Pending,
            enrollment,
            submitter: submitter.to_string(),
            owner: None,
            created: now,
            modified: now,
            notes: None,
            nonce: None,
            cert_id: None,
            result: OperationResult::Success,
            error_message: None,
            edits: Vec::new(),
        }
    }

    pub fn check_pending(&self) -> PkiEmptyResult {
        if self.status.is_terminal() {
            return Err(Error::RequestNotPending(self.id, self.status))
        }
        Ok(())
    }

    /// Moves a pending request into a new status.
    pub fn transition(
        &mut self, status: RequestStatus, now: DateTime<Utc>
    ) -> PkiEmptyResult {
        self.check_pending()?;
        self.status = status;
        self.modified = now;
        Ok(())
    }

    /// Rejects the request recording the reason.
    pub fn reject(&mut self, msg: String, now: DateTime<Utc>) -> PkiEmptyResult {
        self.transition(RequestStatus::Rejected, now)?;
        self.result = OperationResult::Failure;
        self.error_message = Some(msg);
        Ok(())
    }

    /// Returns the summary shown to the submitter.
    pub fn info(&self, service_base: &str) -> CertRequestInfo {
        let cert_request_type = match self.request_type {
            RequestType::Enrollment | RequestType::Renewal => {
                Some(PKCS10.to_string())
            }
            _ => None,
        };
        CertRequestInfo {
            id: self.id,
            request_type: self.request_type,
            status: self.status,
            url: Some(format!(
                "{service_base}/{REST_BASE}/certrequests/{}", self.id
            )),
            cert_id: self.cert_id,
            cert_url: self.cert_id.map(|cert| {
                format!("{service_base}/{REST_BASE}/certs/{cert}")
            }),
            cert_request_type,
            operation_result: self.result,
            error_message: self.error_message.clone(),
        }
    }
}


//------------ RequestRepository ---------------------------------------------

#[derive(Debug)]
pub struct RequestRepository {
    store: KeyValueStore,
    next_id: Mutex<u64>,
    max_list_size: usize,
}

impl RequestRepository {
    pub fn create(config: &Config) -> PkiResult<Self> {
        let store = KeyValueStore::create(config.storage_uri()?, NS_REQUESTS)?;
        let last = store.keys()?.iter().filter_map(|key| {
            key.parse::<u64>().ok()
        }).max().unwrap_or(0);
        Ok(RequestRepository {
            store,
            next_id: Mutex::new(last + 1),
            max_list_size: config.max_list_size,
        })
    }

    /// Keys are zero padded so that they sort numerically.
    fn key(id: RequestId) -> String {
        format!("{:020}", id.to_u64())
    }

    pub fn next_id(&self) -> RequestId {
        let mut next = self.next_id.lock().expect("poisoned lock");
        let id = *next;
        *next += 1;
        id.into()
    }

    pub fn get(&self, id: RequestId) -> PkiResult<RequestRecord> {
        self.store.get(&Self::key(id))?.ok_or(Error::RequestUnknown(id))
    }

    pub fn save(&self, record: &RequestRecord) -> PkiEmptyResult {
        self.store.store(&Self::key(record.id), record)?;
        info!(
            "Request {} ({}) is {}",
            record.id, record.request_type, record.status
        );
        Ok(())
    }

    /// Stores a record whose status did not change.
    pub fn store_nonce(&self, record: &RequestRecord) -> PkiEmptyResult {
        self.store.store(&Self::key(record.id), record).map_err(Into::into)
    }

    pub fn list(
        &self, query: &RequestQuery, service_base: &str
    ) -> PkiResult<CertRequestInfos> {
        let mut records = self.store.values::<RequestRecord>()?;
        records.retain(|record| {
            query.status.is_none_or(|status| record.status == status)
                && query.request_type.is_none_or(|request_type| {
                    record.request_type == request_type
                })
        });
        let size = query.size.unwrap_or(self.max_list_size)
            .min(self.max_list_size);
        Ok(CertRequestInfos {
            total: records.len(),
            entries: records.iter()
                .skip(query.start)
                .take(size)
                .map(|record| record.info(service_base))
                .collect(),
        })
    }
}


//============ Tests =========================================================
