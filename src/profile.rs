//! The current user's profile.
//!
//! Only [`ProfileInput`] fields are ever persisted. [`Profile`] adds the
//! derived `has_custom_avatar` and `authenticated` flags, recomputed from the
//! stored record on every read and write.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::bus::{Change, ChangeBus, Subscription};
use crate::store::{DurableStore, PROFILE_KEY};

/// Placeholder avatar used when the profile has none.
pub const DEFAULT_AVATAR: &str = "/static/images/user.jpg";

/// Skill level assumed when the profile has none.
pub const DEFAULT_SKILL_LEVEL: &str = "Intermediate";

/// Profile fields as supplied by callers or the server, and as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
  /// Absent for guests. The server may send a number.
  #[serde(
    default,
    deserialize_with = "deserialize_id",
    skip_serializing_if = "Option::is_none"
  )]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub avatar: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub skill_level: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub date_of_birth: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub gender: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub position: Option<String>,
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(match Option::<Value>::deserialize(deserializer)? {
    Some(Value::String(s)) => Some(s),
    Some(Value::Number(n)) => Some(n.to_string()),
    _ => None,
  })
}

fn non_empty(value: Option<String>) -> Option<String> {
  value.filter(|v| !v.trim().is_empty())
}

/// A profile as seen by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
  pub id: Option<String>,
  pub name: Option<String>,
  pub email: Option<String>,
  pub avatar: String,
  pub skill_level: String,
  pub date_of_birth: Option<String>,
  pub gender: Option<String>,
  pub position: Option<String>,
  pub has_custom_avatar: bool,
  pub authenticated: bool,
}

impl Profile {
  /// The empty record: no id, default avatar and skill level.
  pub fn guest() -> Self {
    Self::from_input(ProfileInput::default())
  }

  /// Apply defaults and derive the computed flags.
  pub fn from_input(input: ProfileInput) -> Self {
    let id = non_empty(input.id);
    let avatar = non_empty(input.avatar).unwrap_or_else(|| DEFAULT_AVATAR.to_string());
    let skill_level =
      non_empty(input.skill_level).unwrap_or_else(|| DEFAULT_SKILL_LEVEL.to_string());

    Self {
      has_custom_avatar: avatar != DEFAULT_AVATAR,
      authenticated: id.is_some(),
      id,
      name: input.name,
      email: input.email,
      avatar,
      skill_level,
      date_of_birth: input.date_of_birth,
      gender: input.gender,
      position: input.position,
    }
  }

  /// The persisted form, without derived fields.
  fn record(&self) -> ProfileInput {
    ProfileInput {
      id: self.id.clone(),
      name: self.name.clone(),
      email: self.email.clone(),
      avatar: Some(self.avatar.clone()),
      skill_level: Some(self.skill_level.clone()),
      date_of_birth: self.date_of_birth.clone(),
      gender: self.gender.clone(),
      position: self.position.clone(),
    }
  }
}

impl Default for Profile {
  fn default() -> Self {
    Self::guest()
  }
}

struct Inner {
  store: DurableStore,
  bus: ChangeBus,
}

/// Single-record profile state, persisted and published like favourites.
#[derive(Clone)]
pub struct ProfileStore {
  inner: Arc<Inner>,
}

impl ProfileStore {
  pub fn new(store: DurableStore, bus: ChangeBus) -> Self {
    Self {
      inner: Arc::new(Inner { store, bus }),
    }
  }

  pub fn get_profile(&self) -> Profile {
    let record = self.inner.store.read(PROFILE_KEY, &ProfileInput::default());
    Profile::from_input(record)
  }

  /// Replace the stored profile with `input`. Nothing from the previous
  /// record is carried over.
  pub fn set_profile(&self, input: ProfileInput) -> Profile {
    let profile = Profile::from_input(input);
    self.inner.store.write(PROFILE_KEY, &profile.record());
    self.inner.bus.publish(Change::Profile(profile.clone()));
    profile
  }

  /// Remove the stored profile and publish the guest record.
  pub fn clear_profile(&self) -> Profile {
    self.inner.store.remove(PROFILE_KEY);
    let guest = Profile::guest();
    self.inner.bus.publish(Change::Profile(guest.clone()));
    guest
  }

  /// Subscribe to profile changes. `callback` runs immediately with the
  /// current value.
  pub fn subscribe<F>(&self, callback: F) -> Subscription
  where
    F: Fn(&Profile) + Send + Sync + 'static,
  {
    self
      .inner
      .bus
      .subscribe_with_current(Change::Profile(self.get_profile()), move |change| {
        if let Change::Profile(profile) = change {
          callback(profile);
        }
      })
  }
}
