//! The repository of issued certificates.

use std::sync::Mutex;
use chrono::{DateTime, Utc};
use log::info;
use crate::api::cert::{
    CertData, CertDataInfos, CertId, CertQuery, CertStatus, RevocationReason,
};
use crate::commons::{PkiEmptyResult, PkiResult};
use crate::commons::actor::Actor;
use crate::commons::error::Error;
use crate::commons::storage::KeyValueStore;
use crate::config::Config;
use crate::constants::NS_CERTS;
use super::policy::{DistinguishedName, SubjectLookup};


//------------ CertRepository ------------------------------------------------

/// Keeps all issued certificates by serial number.
#[derive(Debug)]
pub struct CertRepository {
    store: KeyValueStore,

    /// The next sequential serial number.
    next_serial: Mutex<u64>,

    /// Held while reading and writing back a certificate's status.
    status: Mutex<()>,

    random_serials: bool,
    max_list_size: usize,
}

impl CertRepository {
    pub fn create(config: &Config) -> PkiResult<Self> {
        let store = KeyValueStore::create(config.storage_uri()?, NS_CERTS)?;
        let last = store.keys()?.iter().filter_map(|key| {
            u64::from_str_radix(key, 16).ok()
        }).max().unwrap_or(0);
        Ok(CertRepository {
            store,
            next_serial: Mutex::new(last + 1),
            status: Mutex::new(()),
            random_serials: config.random_serial_numbers,
            max_list_size: config.max_list_size,
        })
    }

    fn key(id: CertId) -> String {
        format!("{:016x}", id.to_u64())
    }

    /// Allocates a serial number for a new certificate.
    pub fn next_serial(&self) -> PkiResult<CertId> {
        let mut next = self.next_serial.lock().expect("poisoned lock");
        if self.random_serials {
            loop {
                // Serials are positive 63 bit values.
                let serial = rand::random::<u64>() >> 1;
                if serial != 0 && !self.store.has(&Self::key(serial.into()))? {
                    return Ok(serial.into())
                }
            }
        }
        let serial = *next;
        *next += 1;
        Ok(serial.into())
    }

    /// Adds a new certificate.
    pub fn add(&self, cert: CertData) -> PkiEmptyResult {
        let key = Self::key(cert.id);
        if self.store.has(&key)? {
            return Err(Error::custom(
                format!("certificate {} already exists", cert.id)
            ))
        }
        self.store.store(&key, &cert)?;
        info!(
            "Issued certificate {} for '{}'", cert.id, cert.subject_dn
        );
        Ok(())
    }

    pub fn get(&self, id: CertId) -> PkiResult<CertData> {
        self.store.get(&Self::key(id))?.ok_or(Error::CertUnknown(id))
    }

    /// Returns the certificates matching the query, ordered by serial.
    pub fn list(&self, query: &CertQuery) -> PkiResult<CertDataInfos> {
        let mut certs = self.store.values::<CertData>()?;
        certs.retain(|cert| query.matches(cert));
        certs.sort_by_key(|cert| cert.id);
        let size = query.size.unwrap_or(self.max_list_size)
            .min(self.max_list_size);
        Ok(CertDataInfos {
            total: certs.len(),
            entries: certs.iter()
                .skip(query.start)
                .take(size)
                .map(CertData::info)
                .collect(),
        })
    }

    /// Revokes a valid certificate.
    pub fn revoke(
        &self,
        id: CertId,
        reason: RevocationReason,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> PkiResult<CertData> {
        let _lock = self.status.lock().expect("poisoned lock");
        let mut cert = self.get(id)?;
        if cert.status != CertStatus::Valid {
            return Err(Error::CertNotValid(id, cert.status))
        }
        cert.status = CertStatus::Revoked;
        cert.revoked_on = Some(now);
        cert.revoked_by = Some(actor.name().to_string());
        cert.revocation_reason = Some(reason);
        self.store.store(&Self::key(id), &cert)?;
        info!("Certificate {} revoked by {}: {}", id, actor, reason);
        Ok(cert)
    }

    /// Releases a certificate from hold.
    pub fn unrevoke(&self, id: CertId, actor: &Actor) -> PkiResult<CertData> {
        let _lock = self.status.lock().expect("poisoned lock");
        let mut cert = self.get(id)?;
        if cert.status != CertStatus::Revoked
            || cert.revocation_reason != Some(RevocationReason::CertificateHold)
        {
            return Err(Error::CertNotOnHold(id))
        }
        cert.status = CertStatus::Valid;
        cert.revoked_on = None;
        cert.revoked_by = None;
        cert.revocation_reason = None;
        self.store.store(&Self::key(id), &cert)?;
        info!("Certificate {} released from hold by {}", id, actor);
        Ok(cert)
    }

    /// Marks all valid certificates past their not after time as expired.
    ///
    /// Returns the serials of the expired certificates.
    pub fn expire(&self, now: DateTime<Utc>) -> PkiResult<Vec<CertId>> {
        let mut res = Vec::new();
        for key in self.store.keys()? {
            let _lock = self.status.lock().expect("poisoned lock");
            let Some(mut cert) = self.store.get::<CertData>(&key)? else {
                continue
            };
            if cert.status == CertStatus::Valid && cert.not_after < now {
                cert.status = CertStatus::Expired;
                self.store.store(&Self::key(cert.id), &cert)?;
                info!("Certificate {} expired", cert.id);
                res.push(cert.id);
            }
        }
        Ok(res)
    }
}

impl SubjectLookup for CertRepository {
    fn subject_in_use(
        &self, subject: &DistinguishedName, exclude: Option<CertId>
    ) -> PkiResult<bool> {
        let subject = subject.to_string();
        Ok(self.store.values::<CertData>()?.iter().any(|cert| {
            cert.is_valid()
                && Some(cert.id) != exclude
                && cert.subject_dn.eq_ignore_ascii_case(&subject)
        }))
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use chrono::Duration;
    use crate::api::admin::Token;

    fn config() -> Config {
        Config::test(Path::new("/tmp"), 0, Token::from("secret"))
    }

    fn cert(repo: &CertRepository, subject: &str, days: i64) -> CertData {
        let now = Utc::now();
        let cert = CertData {
            id: repo.next_serial().unwrap(),
            subject_dn: subject.into(),
            issuer_dn: "CN=Test CA".into(),
            status: CertStatus::Valid,
            not_before: now - Duration::days(1),
            not_after: now + Duration::days(days),
            encoded: String::new(),
            request_id: None,
            profile_id: Some("caUserCert".into()),
            issued_on: now,
            issued_by: None,
            revoked_on: None,
            revoked_by: None,
            revocation_reason: None,
        };
        repo.add(cert.clone()).unwrap();
        cert
    }

    #[test]
    fn sequential_and_random_serials() {
        let config = config();
        let repo = CertRepository::create(&config).unwrap();
        let first = cert(&repo, "UID=a", 10);
        let second = cert(&repo, "UID=b", 10);
        assert_eq!(first.id, CertId::new(1));
        assert_eq!(second.id, CertId::new(2));
        assert!(repo.add(first.clone()).is_err());

        // A reopened repository continues after the highest serial.
        let again = CertRepository::create(&config).unwrap();
        assert_eq!(again.next_serial().unwrap(), CertId::new(3));

        let mut config = config;
        config.random_serial_numbers = true;
        let random = CertRepository::create(&config).unwrap();
        let serial = random.next_serial().unwrap().to_u64();
        assert!(serial > 0 && serial < 1 << 63);
    }

    #[test]
    fn status_transitions() {
        let repo = CertRepository::create(&config()).unwrap();
        let agent = Actor::user("agent");
        let now = Utc::now();

        let held = cert(&repo, "UID=held", 10);
        repo.revoke(held.id, RevocationReason::CertificateHold, &agent, now)
            .unwrap();
        assert!(matches!(
            repo.revoke(held.id, RevocationReason::KeyCompromise, &agent, now),
            Err(Error::CertNotValid(_, CertStatus::Revoked))
        ));
        let released = repo.unrevoke(held.id, &agent).unwrap();
        assert_eq!(released.status, CertStatus::Valid);
        assert!(released.revocation_reason.is_none());

        let revoked = cert(&repo, "UID=revoked", 10);
        repo.revoke(revoked.id, RevocationReason::KeyCompromise, &agent, now)
            .unwrap();
        assert!(matches!(
            repo.unrevoke(revoked.id, &agent), Err(Error::CertNotOnHold(_))
        ));
        assert!(matches!(
            repo.unrevoke(CertId::new(99), &agent), Err(Error::CertUnknown(_))
        ));

        let old = cert(&repo, "UID=old", -1);
        assert_eq!(repo.expire(now).unwrap(), vec![old.id]);
        assert_eq!(repo.get(old.id).unwrap().status, CertStatus::Expired);
        assert!(repo.expire(now).unwrap().is_empty());
        assert!(matches!(
            repo.revoke(old.id, RevocationReason::Unspecified, &agent, now),
            Err(Error::CertNotValid(_, CertStatus::Expired))
        ));
        assert!(matches!(
            repo.unrevoke(old.id, &agent), Err(Error::CertNotOnHold(_))
        ));
    }

    #[test]
    fn expire_keeps_concurrent_revocation() {
        let repo = CertRepository::create(&config()).unwrap();
        let agent = Actor::user("agent");
        let now = Utc::now();
        for _ in 0..20 {
            let old = cert(&repo, "UID=old", -1);
            let (revoked, expired) = std::thread::scope(|scope| {
                let revoke = scope.spawn(|| {
                    repo.revoke(
                        old.id, RevocationReason::KeyCompromise, &agent, now
                    )
                });
                let expired = repo.expire(now).unwrap();
                (revoke.join().unwrap(), expired)
            });
            let stored = repo.get(old.id).unwrap();
            if revoked.is_ok() {
                assert_eq!(stored.status, CertStatus::Revoked);
                assert!(!expired.contains(&old.id));
            }
            else {
                assert_eq!(stored.status, CertStatus::Expired);
                assert!(expired.contains(&old.id));
            }
        }
    }

    #[test]
    fn list_and_lookup() {
        let mut config = config();
        config.max_list_size = 2;
        let repo = CertRepository::create(&config).unwrap();
        for name in ["UID=a", "UID=b", "UID=c"] {
            cert(&repo, name, 10);
        }
        let all = repo.list(&CertQuery::default()).unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.entries.len(), 2);

        let query = CertQuery {
            subject: Some("uid=c".into()),
            ..Default::default()
        };
        assert_eq!(repo.list(&query).unwrap().total, 1);

        let query = CertQuery { start: 2, ..Default::default() };
        assert_eq!(repo.list(&query).unwrap().entries[0].subject_dn, "UID=c");

        let subject: DistinguishedName = "UID=b".parse().unwrap();
        assert!(repo.subject_in_use(&subject, None).unwrap());
        assert!(!repo.subject_in_use(&subject, Some(CertId::new(2))).unwrap());
    }
}
