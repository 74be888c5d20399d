//! The registry of certificate profiles.

use std::sync::Mutex;
use log::info;
use regex::Regex;
use crate::api::profile::{Profile, ProfileDataInfos, RawProfile};
use crate::commons::{PkiEmptyResult, PkiResult};
use crate::commons::actor::Actor;
use crate::commons::error::Error;
use crate::commons::storage::KeyValueStore;
use crate::config::Config;
use crate::constants::NS_PROFILES;
use super::policy;


/// The profiles a new server starts with.
const BUILT_IN_PROFILES: [&str; 3] = [
    include_str!("../../defaults/profiles/caUserCert.cfg"),
    include_str!("../../defaults/profiles/caServerCert.cfg"),
    include_str!("../../defaults/profiles/caAgentServerCert.cfg"),
];

lazy_static::lazy_static! {
    static ref PROFILE_ID: Regex = Regex::new(
        "^[a-zA-Z0-9_]+$"
    ).expect("valid regex");
}


//------------ ProfileRegistry -----------------------------------------------

/// Keeps the profiles by id.
#[derive(Debug)]
pub struct ProfileRegistry {
    store: KeyValueStore,

    /// Serializes check-then-store updates.
    lock: Mutex<()>,

    service_uri: String,
    max_list_size: usize,
}

impl ProfileRegistry {
    /// Opens the registry, seeding the built-in profiles into a new store.
    pub fn create(config: &Config) -> PkiResult<Self> {
        let registry = ProfileRegistry {
            store: KeyValueStore::create(config.storage_uri()?, NS_PROFILES)?,
            lock: Mutex::new(()),
            service_uri: config.service_uri.clone(),
            max_list_size: config.max_list_size,
        };
        if registry.store.is_empty()? {
            for content in BUILT_IN_PROFILES {
                let profile = prepare(Profile::from_raw(content)?)?;
                info!("Adding built-in profile '{}'", profile.id);
                registry.store.store(&profile.id, &profile)?;
            }
        }
        Ok(registry)
    }

    /// Lists profiles.
    ///
    /// Without `include_disabled` only enabled and visible profiles are
    /// returned.
    pub fn list(
        &self, include_disabled: bool, start: usize, size: Option<usize>
    ) -> PkiResult<ProfileDataInfos> {
        let mut profiles = self.store.values::<Profile>()?;
        if !include_disabled {
            profiles.retain(|profile| profile.enabled && profile.visible);
        }
        let size = size.unwrap_or(self.max_list_size).min(self.max_list_size);
        Ok(ProfileDataInfos {
            total: profiles.len(),
            entries: profiles.iter()
                .skip(start)
                .take(size)
                .map(|profile| profile.info(&self.service_uri))
                .collect(),
        })
    }

    /// Returns a profile.
    ///
    /// Disabled profiles are reported unknown unless `include_disabled`.
    pub fn show(&self, id: &str, include_disabled: bool) -> PkiResult<Profile> {
        let profile = self.get(id)?;
        if !include_disabled && !profile.enabled {
            return Err(Error::ProfileUnknown(id.to_string()))
        }
        Ok(profile)
    }

    /// Returns an enabled profile for enrollment.
    pub fn get_enabled(&self, id: &str) -> PkiResult<Profile> {
        match self.store.get::<Profile>(id)? {
            Some(profile) if profile.enabled => Ok(profile),
            _ => Err(Error::ProfileNotEnabled(id.to_string())),
        }
    }

    pub fn show_raw(
        &self, id: &str, include_disabled: bool
    ) -> PkiResult<RawProfile> {
        self.show(id, include_disabled).map(|profile| {
            RawProfile { content: profile.to_raw() }
        })
    }

    /// Adds a new profile. New profiles always start out disabled.
    pub fn add(&self, profile: Profile) -> PkiResult<Profile> {
        let mut profile = prepare(profile)?;
        let _lock = self.lock.lock().expect("poisoned lock");
        if self.store.has(&profile.id)? {
            return Err(Error::ProfileDuplicate(profile.id))
        }
        profile.enabled = false;
        profile.enabled_by = None;
        self.store.store(&profile.id, &profile)?;
        info!("Added profile '{}'", profile.id);
        Ok(profile)
    }

    pub fn add_raw(&self, raw: &RawProfile) -> PkiResult<RawProfile> {
        let profile = self.add(Profile::from_raw(&raw.content)?)?;
        Ok(RawProfile { content: profile.to_raw() })
    }

    /// Replaces a disabled profile.
    pub fn modify(&self, id: &str, profile: Profile) -> PkiResult<Profile> {
        if profile.id != id {
            return Err(Error::ProfileIdMismatch(id.to_string(), profile.id))
        }
        let mut profile = prepare(profile)?;
        let _lock = self.lock.lock().expect("poisoned lock");
        let current = self.get(id)?;
        if current.enabled {
            return Err(Error::ProfileEnabled(id.to_string()))
        }
        profile.enabled = false;
        profile.enabled_by = None;
        self.store.store(id, &profile)?;
        info!("Modified profile '{id}'");
        Ok(profile)
    }

    pub fn modify_raw(
        &self, id: &str, raw: &RawProfile
    ) -> PkiResult<RawProfile> {
        let profile = self.modify(id, Profile::from_raw(&raw.content)?)?;
        Ok(RawProfile { content: profile.to_raw() })
    }

    pub fn enable(&self, id: &str, actor: &Actor) -> PkiEmptyResult {
        let _lock = self.lock.lock().expect("poisoned lock");
        let mut profile = self.get(id)?;
        if profile.enabled {
            return Err(Error::ProfileEnabled(id.to_string()))
        }
        profile.enabled = true;
        profile.enabled_by = Some(actor.name().to_string());
        self.store.store(id, &profile)?;
        info!("Profile '{id}' enabled by {actor}");
        Ok(())
    }

    pub fn disable(&self, id: &str, actor: &Actor) -> PkiEmptyResult {
        let _lock = self.lock.lock().expect("poisoned lock");
        let mut profile = self.get(id)?;
        if !profile.enabled {
            return Err(Error::ProfileDisabled(id.to_string()))
        }
        profile.enabled = false;
        profile.enabled_by = None;
        self.store.store(id, &profile)?;
        info!("Profile '{id}' disabled by {actor}");
        Ok(())
    }

    /// Deletes a disabled profile.
    pub fn delete(&self, id: &str) -> PkiEmptyResult {
        let _lock = self.lock.lock().expect("poisoned lock");
        if self.get(id)?.enabled {
            return Err(Error::ProfileEnabled(id.to_string()))
        }
        self.store.delete(id)?;
        info!("Deleted profile '{id}'");
        Ok(())
    }

    fn get(&self, id: &str) -> PkiResult<Profile> {
        if !PROFILE_ID.is_match(id) {
            return Err(Error::ProfileUnknown(id.to_string()))
        }
        self.store.get(id)?.ok_or_else(|| {
            Error::ProfileUnknown(id.to_string())
        })
    }
}

/// Validates a profile and fills in the attributes of its inputs.
fn prepare(mut profile: Profile) -> PkiResult<Profile> {
    if !PROFILE_ID.is_match(&profile.id) {
        return Err(Error::ProfileInvalidId(profile.id))
    }
    policy::check_profile(&profile)?;
    for input in &mut profile.inputs {
        if input.attributes.is_empty() {
            if let Some(attrs) = policy::input_attributes(&input.class_id) {
                input.attributes = attrs;
            }
        }
    }
    Ok(profile)
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use crate::api::admin::Token;
    use crate::server::policy::tests::user_profile;

    fn registry() -> ProfileRegistry {
        let config = Config::test(Path::new("/tmp"), 8443, Token::from("x"));
        ProfileRegistry::create(&config).unwrap()
    }

    #[test]
    fn built_in_profiles() {
        let registry = registry();
        let list = registry.list(false, 0, None).unwrap();
        assert_eq!(list.total, 3);
        assert!(list.entries.iter().any(|entry| {
            entry.id == "caUserCert"
                && entry.url.as_deref() == Some(
                    "http://localhost:8443/ca/rest/profiles/caUserCert"
                )
        }));

        let user = registry.show("caUserCert", false).unwrap();
        assert!(user.enabled);
        let input = user.get_input("i1").unwrap();
        assert!(input.get_attribute("cert_request").is_some());

        let agent = registry.show("caAgentServerCert", false).unwrap();
        assert_eq!(agent.authenticator_id.as_deref(), Some("AgentCertAuth"));
    }

    #[test]
    fn lifecycle() {
        let registry = registry();
        let admin = Actor::admin();
        let mut profile = user_profile();
        profile.enabled = true;

        let added = registry.add(profile.clone()).unwrap();
        assert!(!added.enabled);
        assert!(matches!(
            registry.add(profile.clone()), Err(Error::ProfileDuplicate(_))
        ));

        // Disabled profiles are hidden from anonymous callers.
        assert!(matches!(
            registry.show("testUserCert", false), Err(Error::ProfileUnknown(_))
        ));
        assert_eq!(registry.list(false, 0, None).unwrap().total, 3);
        assert_eq!(registry.list(true, 0, None).unwrap().total, 4);
        assert!(matches!(
            registry.get_enabled("testUserCert"),
            Err(Error::ProfileNotEnabled(_))
        ));

        registry.enable("testUserCert", &admin).unwrap();
        assert!(matches!(
            registry.enable("testUserCert", &admin),
            Err(Error::ProfileEnabled(_))
        ));
        let enabled = registry.get_enabled("testUserCert").unwrap();
        assert_eq!(enabled.enabled_by.as_deref(), Some("admin"));

        profile.description = Some("changed".into());
        assert!(matches!(
            registry.modify("testUserCert", profile.clone()),
            Err(Error::ProfileEnabled(_))
        ));
        assert!(matches!(
            registry.delete("testUserCert"), Err(Error::ProfileEnabled(_))
        ));

        registry.disable("testUserCert", &admin).unwrap();
        assert!(matches!(
            registry.disable("testUserCert", &admin),
            Err(Error::ProfileDisabled(_))
        ));
        assert!(matches!(
            registry.modify("other", profile.clone()),
            Err(Error::ProfileIdMismatch(_, _))
        ));
        let modified = registry.modify("testUserCert", profile).unwrap();
        assert_eq!(modified.description.as_deref(), Some("changed"));

        registry.delete("testUserCert").unwrap();
        assert!(matches!(
            registry.show("testUserCert", true), Err(Error::ProfileUnknown(_))
        ));
    }

    #[test]
    fn reject_invalid_profiles() {
        let registry = registry();
        let mut profile = user_profile();
        profile.id = "bad id".into();
        assert!(matches!(
            registry.add(profile), Err(Error::ProfileInvalidId(_))
        ));

        let mut profile = user_profile();
        profile.policy_sets.policy_sets[0].policies[0]
            .constraint.set_value("pattern", "UID=(");
        assert!(matches!(
            registry.add(profile), Err(Error::ProfileInvalid(_, _))
        ));

        let mut profile = user_profile();
        profile.policy_sets.policy_sets[0].policies[0]
            .default.class_id = "fooDefaultImpl".into();
        assert!(matches!(
            registry.add(profile), Err(Error::ProfileInvalid(_, _))
        ));
    }

    #[test]
    fn raw_profiles() {
        let registry = registry();
        let raw = registry.show_raw("caServerCert", false).unwrap();
        let content = raw.content.replace("caServerCert", "caCopyCert");
        let added = registry.add_raw(&RawProfile { content }).unwrap();
        let profile = Profile::from_raw(&added.content).unwrap();
        assert_eq!(profile.id, "caCopyCert");
        assert!(!profile.enabled);

        let modified = registry.modify_raw(
            "caCopyCert",
            &RawProfile {
                content: added.content.replace(
                    "name=Manual Server", "name=Copied Server"
                )
            }
        ).unwrap();
        assert!(modified.content.contains("name=Copied Server"));

        assert!(matches!(
            registry.add_raw(&RawProfile { content: "garbage".into() }),
            Err(Error::ProfileRaw(_))
        ));
    }
}
