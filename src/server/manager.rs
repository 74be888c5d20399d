//! The certificate server orchestrating all components.

use std::sync::{Arc, Mutex};
use chrono::{DateTime, Utc};
use log::{info, warn};
use crate::api::admin::{ServerInfo, Token};
use crate::api::cert::{
    CertData, CertDataInfos, CertId, CertQuery, CertRevokeRequest,
    CertStatus,
};
use crate::api::profile::Profile;
use crate::api::request::{
    CertEnrollmentRequest, CertRequestInfo, CertRequestInfos,
    CertReviewResponse, RequestId, RequestQuery, RequestStatus, RequestType,
    ReviewAction,
};
use crate::commons::{PkiEmptyResult, PkiResult};
use crate::commons::actor::Actor;
use crate::commons::error::Error;
use crate::config::Config;
use crate::constants::{
    GROUP_ADMINISTRATORS, GROUP_AGENTS, PKI_SERVER_APP, PKI_VERSION,
};
use super::ca::CertAuthority;
use super::certs::CertRepository;
use super::csr::Csr;
use super::policy::{
    self, CertTemplate, PolicyContext, PolicyEdit, SERIAL_RENEW_INPUT,
};
use super::profiles::ProfileRegistry;
use super::requests::{RequestRecord, RequestRepository};
use super::users::UserManager;


//------------ PkiManager ----------------------------------------------------

/// The certificate server.
///
/// Owns the CA, the repositories and the registries and runs the request
/// workflow on top of them.
pub struct PkiManager {
    ca: CertAuthority,
    certs: CertRepository,
    requests: RequestRepository,
    profiles: ProfileRegistry,
    users: UserManager,

    /// Serializes changes to requests.
    lock: Mutex<()>,

    started: DateTime<Utc>,
    pub config: Arc<Config>,
}

/// # Set up and initialization
impl PkiManager {
    /// Creates the server. State is kept in the configured storage.
    pub fn build(config: Arc<Config>) -> PkiResult<Self> {
        info!("Starting {} v{}", PKI_SERVER_APP, PKI_VERSION);
        info!("{} uses service uri: {}", PKI_SERVER_APP, config.service_uri);

        let certs = CertRepository::create(&config)?;
        let ca = CertAuthority::init(&config, &certs)?;
        info!("Using CA '{}' with serial {}", ca.subject(), ca.serial());

        Ok(PkiManager {
            ca,
            certs,
            requests: RequestRepository::create(&config)?,
            profiles: ProfileRegistry::create(&config)?,
            users: UserManager::create(&config)?,
            lock: Mutex::new(()),
            started: Utc::now(),
            config,
        })
    }

    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            version: PKI_VERSION.to_string(),
            started: self.started,
            ca_subject_dn: self.ca.subject().to_string(),
            ca_serial: self.ca.serial(),
        }
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    pub fn users(&self) -> &UserManager {
        &self.users
    }
}

/// # Authentication and authorization
impl PkiManager {
    /// Returns the actor for a bearer token.
    pub fn authenticate(&self, token: &Token) -> PkiResult<Actor> {
        if token == &self.config.admin_token {
            return Ok(Actor::admin())
        }
        match self.users.authenticate(token)? {
            Some(user) => Ok(Actor::user(&user)),
            None => Err(Error::ApiInvalidCredentials("unknown token".into())),
        }
    }

    /// Returns whether the actor may act as a certificate manager agent.
    pub fn is_agent(&self, actor: &Actor) -> PkiResult<bool> {
        if actor.is_admin() {
            return Ok(true)
        }
        if !actor.is_user() {
            return Ok(false)
        }
        self.users.is_member(actor.name(), GROUP_AGENTS)
    }

    /// Returns whether the actor may administer profiles, users and groups.
    pub fn is_admin(&self, actor: &Actor) -> PkiResult<bool> {
        if actor.is_admin() {
            return Ok(true)
        }
        if !actor.is_user() {
            return Ok(false)
        }
        self.users.is_member(actor.name(), GROUP_ADMINISTRATORS)
    }
}

/// # Enrollment
impl PkiManager {
    /// Returns an empty enrollment request for an enabled profile.
    pub fn template(&self, profile: &str) -> PkiResult<CertEnrollmentRequest> {
        self.profiles.get_enabled(profile).map(|profile| {
            CertEnrollmentRequest::template(&profile)
        })
    }

    /// Submits an enrollment or renewal request.
    ///
    /// Requests that violate a constraint are stored as rejected. If the
    /// profile names an authenticator and the actor is an agent, the
    /// certificate is issued right away.
    pub fn submit(
        &self, mut enrollment: CertEnrollmentRequest, actor: &Actor
    ) -> PkiResult<CertRequestInfos> {
        let now = Utc::now();
        let request_type = if enrollment.renewal {
            let serial = self.renewal_serial(&enrollment)?;
            let cert = self.certs.get(serial)?;
            if cert.status == CertStatus::Revoked {
                return Err(Error::CertNotValid(serial, cert.status))
            }
            enrollment.serial_number = Some(serial);
            if enrollment.profile_id.is_empty() {
                enrollment.profile_id = cert.profile_id.unwrap_or_default();
            }
            RequestType::Renewal
        }
        else {
            RequestType::Enrollment
        };

        let profile = self.profiles.get_enabled(&enrollment.profile_id)?;
        let _lock = self.lock.lock().expect("poisoned lock");
        let mut record = RequestRecord::new(
            self.requests.next_id(), request_type, enrollment,
            actor.name(), now
        );

        let evaluated = self.with_context(&record, now, |ctx| {
            let template = policy::build_template(&profile, ctx, &[])?;
            let checked = policy::validate(&profile, ctx, &template);
            Ok((template, checked))
        })?;

        match evaluated {
            (_, Err(Error::RequestConstraint(violation))) => {
                info!("Request {} rejected: {}", record.id, violation);
                record.reject(violation.to_string(), now)?;
            }
            (_, Err(err)) => return Err(err),
            (template, Ok(())) => {
                if profile.authenticator_id.is_some() && self.is_agent(actor)? {
                    self.issue(&profile, &mut record, &template, actor, now)?;
                }
            }
        }

        self.requests.save(&record)?;
        Ok(CertRequestInfos {
            total: 1,
            entries: vec![record.info(self.config.service_base())],
        })
    }

    /// Returns the serial of the certificate a renewal is for.
    fn renewal_serial(
        &self, enrollment: &CertEnrollmentRequest
    ) -> PkiResult<CertId> {
        if let Some(serial) = enrollment.serial_number {
            return Ok(serial)
        }
        enrollment.get_input(SERIAL_RENEW_INPUT)
            .and_then(|input| input.value("serial_num"))
            .ok_or_else(|| {
                Error::RequestInvalid("renewal without serial number".into())
            })?
            .parse()
            .map_err(|err| Error::RequestInvalid(format!("{err}")))
    }

    pub fn show_request(&self, id: RequestId) -> PkiResult<CertRequestInfo> {
        self.requests.get(id).map(|record| {
            record.info(self.config.service_base())
        })
    }

    pub fn list_requests(
        &self, query: &RequestQuery
    ) -> PkiResult<CertRequestInfos> {
        self.requests.list(query, self.config.service_base())
    }
}

/// # Agent review
impl PkiManager {
    /// Returns a request for review, handing out a fresh nonce.
    pub fn review(&self, id: RequestId) -> PkiResult<CertReviewResponse> {
        let _lock = self.lock.lock().expect("poisoned lock");
        let mut record = self.requests.get(id)?;
        let policy_sets = match self.request_profile(&record)? {
            Some(profile) if record.status == RequestStatus::Pending => {
                let template = self.build_template(
                    &profile, &record, &record.edits
                )?;
                policy::review_policy_sets(&profile, &template)?
            }
            _ => Vec::new(),
        };
        record.nonce = Some(uuid::Uuid::new_v4().to_string());
        self.requests.store_nonce(&record)?;

        Ok(CertReviewResponse {
            request: record.enrollment,
            id: record.id,
            request_type: record.request_type,
            status: record.status,
            owner: record.owner,
            created: record.created,
            modified: record.modified,
            notes: record.notes,
            nonce: record.nonce.unwrap_or_default(),
            policy_sets,
        })
    }

    /// Performs a review action.
    ///
    /// The nonce of the review must match the one handed out last. A
    /// matching nonce is consumed whatever the outcome.
    pub fn review_action(
        &self,
        id: RequestId,
        action: ReviewAction,
        review: CertReviewResponse,
        actor: &Actor,
    ) -> PkiResult<CertRequestInfo> {
        let now = Utc::now();
        let _lock = self.lock.lock().expect("poisoned lock");
        let mut record = self.requests.get(id)?;
        if review.nonce.is_empty()
            || record.nonce.as_deref() != Some(review.nonce.as_str())
        {
            return Err(Error::RequestInvalidNonce(id))
        }
        record.nonce = None;
        self.requests.store_nonce(&record)?;
        record.check_pending()?;

        match action {
            ReviewAction::Approve => {
                let profile = self.enrollment_profile(&record)?;
                let edits = self.posted_edits(&profile, &record, &review)?;
                let template = self.build_template(&profile, &record, &edits)?;
                self.with_context(&record, now, |ctx| {
                    policy::validate(&profile, ctx, &template)
                })?;
                record.edits = edits;
                self.issue(&profile, &mut record, &template, actor, now)?;
            }
            ReviewAction::Reject => {
                record.reject(format!("Request rejected by {actor}"), now)?;
            }
            ReviewAction::Cancel => {
                record.transition(RequestStatus::Canceled, now)?;
            }
            ReviewAction::Update => {
                let profile = self.enrollment_profile(&record)?;
                record.edits = self.posted_edits(&profile, &record, &review)?;
                self.build_template(&profile, &record, &record.edits)?;
                record.notes = review.notes;
                record.modified = now;
            }
            ReviewAction::Validate => {
                let profile = self.enrollment_profile(&record)?;
                let edits = self.posted_edits(&profile, &record, &review)?;
                let template = self.build_template(&profile, &record, &edits)?;
                self.with_context(&record, now, |ctx| {
                    policy::validate(&profile, ctx, &template)
                })?;
                return Ok(record.info(self.config.service_base()))
            }
            ReviewAction::Assign => {
                record.owner = Some(actor.name().to_string());
                record.modified = now;
            }
            ReviewAction::Unassign => {
                record.owner = None;
                record.modified = now;
            }
        }

        info!("Request {} {} by {}", record.id, action, actor);
        self.requests.save(&record)?;
        Ok(record.info(self.config.service_base()))
    }

    /// Returns the stored edits with the values changed in a review.
    fn posted_edits(
        &self,
        profile: &Profile,
        record: &RequestRecord,
        review: &CertReviewResponse,
    ) -> PkiResult<Vec<PolicyEdit>> {
        let template = self.build_template(profile, record, &record.edits)?;
        let computed = policy::review_policy_sets(profile, &template)?;
        let mut edits = record.edits.clone();
        policy::merge_edits(
            &mut edits, policy::collect_edits(&computed, &review.policy_sets)
        );
        Ok(edits)
    }

    /// Returns the profile of an enrollment or renewal request.
    fn enrollment_profile(&self, record: &RequestRecord) -> PkiResult<Profile> {
        self.request_profile(record)?.ok_or_else(|| {
            Error::RequestInvalid(format!(
                "{} requests cannot be changed", record.request_type
            ))
        })
    }

    fn request_profile(
        &self, record: &RequestRecord
    ) -> PkiResult<Option<Profile>> {
        match record.request_type {
            RequestType::Enrollment | RequestType::Renewal => {
                self.profiles.show(&record.enrollment.profile_id, true)
                    .map(Some)
            }
            _ => Ok(None),
        }
    }
}

/// # Issuing
impl PkiManager {
    /// Runs `op` with the policy context of a request.
    ///
    /// Subject and key come from the CSR, or from the certificate being
    /// renewed.
    fn with_context<T>(
        &self,
        record: &RequestRecord,
        now: DateTime<Utc>,
        op: impl FnOnce(&PolicyContext) -> PkiResult<T>,
    ) -> PkiResult<T> {
        let renewal_of = match record.request_type {
            RequestType::Renewal => record.enrollment.serial_number,
            _ => None,
        };
        let csr = match renewal_of {
            Some(serial) => Csr::from_certificate(&self.certs.get(serial)?.encoded)?,
            None => Csr::from_request(&record.enrollment)?,
        };
        let ctx = PolicyContext {
            request: &record.enrollment,
            subject: Some(&csr.subject),
            public_key: &csr.public_key,
            renewal_of,
            ca_key: self.ca.key_type(),
            ca_not_after: self.ca.not_after(),
            subjects: &self.certs,
            now,
        };
        op(&ctx)
    }

    fn build_template(
        &self, profile: &Profile, record: &RequestRecord, edits: &[PolicyEdit]
    ) -> PkiResult<CertTemplate> {
        self.with_context(record, Utc::now(), |ctx| {
            policy::build_template(profile, ctx, edits)
        })
    }

    /// Signs the certificate and approves the request.
    fn issue(
        &self,
        profile: &Profile,
        record: &mut RequestRecord,
        template: &CertTemplate,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> PkiEmptyResult {
        let serial = self.certs.next_serial()?;
        let issued = self.ca.issue(template, serial)?;
        self.certs.add(CertData {
            id: serial,
            subject_dn: issued.subject.to_string(),
            issuer_dn: issued.issuer.to_string(),
            status: CertStatus::Valid,
            not_before: issued.not_before,
            not_after: issued.not_after,
            encoded: issued.pem,
            request_id: Some(record.id),
            profile_id: Some(profile.id.clone()),
            issued_on: now,
            issued_by: Some(actor.name().to_string()),
            revoked_on: None,
            revoked_by: None,
            revocation_reason: None,
        })?;
        record.cert_id = Some(serial);
        record.transition(RequestStatus::Approved, now)
    }
}

/// # Certificates
impl PkiManager {
    pub fn show_cert(&self, id: CertId) -> PkiResult<CertData> {
        self.certs.get(id)
    }

    pub fn list_certs(&self, query: &CertQuery) -> PkiResult<CertDataInfos> {
        self.certs.list(query)
    }

    /// Revokes a certificate, recording an approved revocation request.
    pub fn revoke(
        &self, id: CertId, revocation: CertRevokeRequest, actor: &Actor
    ) -> PkiResult<CertRequestInfo> {
        let now = Utc::now();
        let _lock = self.lock.lock().expect("poisoned lock");
        self.certs.revoke(id, revocation.reason, actor, now)?;
        self.record_status_change(
            RequestType::Revocation, id, revocation.comments, actor, now
        )
    }

    /// Releases a certificate from hold.
    pub fn unrevoke(
        &self, id: CertId, actor: &Actor
    ) -> PkiResult<CertRequestInfo> {
        let now = Utc::now();
        let _lock = self.lock.lock().expect("poisoned lock");
        self.certs.unrevoke(id, actor)?;
        self.record_status_change(
            RequestType::Unrevocation, id, None, actor, now
        )
    }

    fn record_status_change(
        &self,
        request_type: RequestType,
        id: CertId,
        notes: Option<String>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> PkiResult<CertRequestInfo> {
        let enrollment = CertEnrollmentRequest {
            serial_number: Some(id),
            ..Default::default()
        };
        let mut record = RequestRecord::new(
            self.requests.next_id(), request_type, enrollment,
            actor.name(), now
        );
        record.cert_id = Some(id);
        record.notes = notes;
        record.transition(RequestStatus::Approved, now)?;
        self.requests.save(&record)?;
        Ok(record.info(self.config.service_base()))
    }

    /// Marks certificates past their validity as expired.
    pub fn expire_certs(&self) -> PkiEmptyResult {
        let _lock = self.lock.lock().expect("poisoned lock");
        let expired = self.certs.expire(Utc::now())?;
        if !expired.is_empty() {
            warn!("{} certificate(s) expired", expired.len());
        }
        Ok(())
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use crate::api::cert::RevocationReason;
    use crate::api::request::OperationResult;
    use crate::api::user::UserData;
    use crate::server::csr::tests::{ec_key, make_csr};
    use crate::server::policy::{CERT_REQ_INPUT, SUBMITTER_INFO_INPUT};

    fn manager() -> PkiManager {
        let config = Config::test(Path::new("/tmp"), 8443, Token::from("x"));
        PkiManager::build(Arc::new(config)).unwrap()
    }

    fn enrollment(profile: &str, subject: &str) -> CertEnrollmentRequest {
        let mut req = CertEnrollmentRequest {
            profile_id: profile.into(),
            ..Default::default()
        };
        req.set_attribute_value(CERT_REQ_INPUT, "cert_request_type", "pkcs10");
        req.set_attribute_value(
            CERT_REQ_INPUT, "cert_request", &make_csr(subject, &ec_key())
        );
        req
    }

    fn approve(manager: &PkiManager, id: RequestId) -> CertRequestInfo {
        let review = manager.review(id).unwrap();
        manager.review_action(
            id, ReviewAction::Approve, review, &Actor::admin()
        ).unwrap()
    }

    #[test]
    fn enroll_review_approve() {
        let manager = manager();
        let anon = Actor::anonymous();
        let mut req = enrollment("caUserCert", "UID=testuser,O=EXAMPLE");
        req.set_attribute_value(
            SUBMITTER_INFO_INPUT, "requestor_email", "test@example.com"
        );
        let submitted = manager.submit(req, &anon).unwrap();
        let info = &submitted.entries[0];
        assert_eq!(info.status, RequestStatus::Pending);

        let review = manager.review(info.id).unwrap();
        assert!(!review.nonce.is_empty());
        assert!(!review.policy_sets.is_empty());

        // A wrong nonce is refused.
        let mut wrong = review.clone();
        wrong.nonce = "wrong".into();
        assert!(matches!(
            manager.review_action(
                info.id, ReviewAction::Approve, wrong, &Actor::admin()
            ),
            Err(Error::RequestInvalidNonce(_))
        ));

        let approved = manager.review_action(
            info.id, ReviewAction::Approve, review.clone(), &Actor::admin()
        ).unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);

        // The nonce is gone once used.
        assert!(matches!(
            manager.review_action(
                info.id, ReviewAction::Cancel, review, &Actor::admin()
            ),
            Err(Error::RequestInvalidNonce(_))
        ));

        let cert = manager.show_cert(approved.cert_id.unwrap()).unwrap();
        assert_eq!(cert.subject_dn, "UID=testuser,O=EXAMPLE");
        assert_eq!(cert.status, CertStatus::Valid);
        assert_eq!(cert.profile_id.as_deref(), Some("caUserCert"));

        // Terminal requests cannot be acted upon.
        let review = manager.review(info.id).unwrap();
        assert!(matches!(
            manager.review_action(
                info.id, ReviewAction::Cancel, review, &Actor::admin()
            ),
            Err(Error::RequestNotPending(_, RequestStatus::Approved))
        ));
    }

    #[test]
    fn constraint_violation_rejects() {
        let manager = manager();
        let req = enrollment("caUserCert", "CN=not a user");
        let info = manager.submit(req, &Actor::anonymous()).unwrap()
            .entries.remove(0);
        assert_eq!(info.status, RequestStatus::Rejected);
        assert_eq!(info.operation_result, OperationResult::Failure);
        assert!(info.error_message.unwrap().contains("Subject Name"));
    }

    #[test]
    fn disabled_profile_and_bad_csr() {
        let manager = manager();
        manager.profiles().disable("caUserCert", &Actor::admin()).unwrap();
        assert!(matches!(
            manager.submit(
                enrollment("caUserCert", "UID=x"), &Actor::anonymous()
            ),
            Err(Error::ProfileNotEnabled(_))
        ));

        let mut req = enrollment("caServerCert", "CN=www.example.com");
        req.set_attribute_value(CERT_REQ_INPUT, "cert_request", "garbage");
        assert!(matches!(
            manager.submit(req, &Actor::anonymous()),
            Err(Error::RequestInvalidCsr(_))
        ));
    }

    #[test]
    fn agent_profile_issues_immediately() {
        let manager = manager();
        manager.users().add_user(UserData::new("agent", "Agent")).unwrap();
        manager.users().add_member(GROUP_AGENTS, "agent").unwrap();
        let agent = Actor::user("agent");
        assert!(manager.is_agent(&agent).unwrap());
        assert!(!manager.is_admin(&agent).unwrap());

        let req = enrollment("caAgentServerCert", "CN=www.example.com");
        let info = manager.submit(req.clone(), &agent).unwrap()
            .entries.remove(0);
        assert_eq!(info.status, RequestStatus::Approved);

        let info = manager.submit(req, &Actor::anonymous()).unwrap()
            .entries.remove(0);
        assert_eq!(info.status, RequestStatus::Pending);
    }

    #[test]
    fn update_edits_policy_values() {
        let manager = manager();
        let req = enrollment("caServerCert", "CN=www.example.com");
        let id = manager.submit(req, &Actor::anonymous()).unwrap()
            .entries[0].id;

        let mut review = manager.review(id).unwrap();
        assert!(review.set_policy_value("subjAltNames", "DNSName:alt.example.com"));
        manager.review_action(
            id, ReviewAction::Update, review, &Actor::admin()
        ).unwrap();

        // Too long a validity violates the constraint and stays pending.
        let mut review = manager.review(id).unwrap();
        let far = (Utc::now() + chrono::Duration::days(2000))
            .format("%Y-%m-%d %H:%M:%S").to_string();
        assert!(review.set_policy_value("notAfter", &far));
        assert!(matches!(
            manager.review_action(
                id, ReviewAction::Validate, review, &Actor::admin()
            ),
            Err(Error::RequestConstraint(_))
        ));

        let approved = approve(&manager, id);
        let cert = manager.show_cert(approved.cert_id.unwrap()).unwrap();
        let x509 = openssl::x509::X509::from_pem(cert.encoded.as_bytes())
            .unwrap();
        let names = x509.subject_alt_names().unwrap();
        assert_eq!(names.get(0).unwrap().dnsname(), Some("alt.example.com"));
    }

    #[test]
    fn revoke_renew_and_release() {
        let manager = manager();
        let agent = Actor::admin();
        let req = enrollment("caServerCert", "CN=www.example.com");
        let id = manager.submit(req, &Actor::anonymous()).unwrap()
            .entries[0].id;
        let serial = approve(&manager, id).cert_id.unwrap();

        // Renewal reuses subject, key and profile.
        let renewal = CertEnrollmentRequest {
            renewal: true,
            serial_number: Some(serial),
            ..Default::default()
        };
        let renewed = manager.submit(renewal.clone(), &Actor::anonymous())
            .unwrap().entries.remove(0);
        assert_eq!(renewed.request_type, RequestType::Renewal);
        let renewed = approve(&manager, renewed.id);
        let cert = manager.show_cert(renewed.cert_id.unwrap()).unwrap();
        assert_eq!(cert.subject_dn, "CN=www.example.com");

        let revocation = CertRevokeRequest {
            reason: RevocationReason::CertificateHold,
            ..Default::default()
        };
        let info = manager.revoke(serial, revocation.clone(), &agent).unwrap();
        assert_eq!(info.request_type, RequestType::Revocation);
        assert_eq!(info.status, RequestStatus::Approved);
        assert!(matches!(
            manager.revoke(serial, revocation, &agent),
            Err(Error::CertNotValid(_, CertStatus::Revoked))
        ));
        assert!(matches!(
            manager.submit(renewal, &Actor::anonymous()),
            Err(Error::CertNotValid(_, CertStatus::Revoked))
        ));

        let info = manager.unrevoke(serial, &agent).unwrap();
        assert_eq!(info.request_type, RequestType::Unrevocation);
        assert_eq!(manager.show_cert(serial).unwrap().status, CertStatus::Valid);
    }

    #[test]
    fn authenticate_tokens() {
        let manager = manager();
        assert!(manager.authenticate(&Token::from("x")).unwrap().is_admin());
        assert!(matches!(
            manager.authenticate(&Token::from("y")),
            Err(Error::ApiInvalidCredentials(_))
        ));
        manager.users().add_user(UserData::new("jdoe", "J Doe")).unwrap();
        let token = manager.users().issue_token("jdoe").unwrap().token;
        let actor = manager.authenticate(&token).unwrap();
        assert_eq!(actor.name(), "jdoe");
        assert!(!manager.is_agent(&actor).unwrap());
    }
}
