//! Key/value resource used by the crate's own tests

use crate::diff::Diff;
use crate::resource::{Observed, Resource};
use crate::types::Refresh;
use anyhow::{Result, bail};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct Store {
    values: RefCell<BTreeMap<String, String>>,
    failing: RefCell<BTreeSet<String>>,
}

impl Store {
    pub fn set(&self, key: &str, value: &str) {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.borrow().get(key).cloned()
    }

    pub fn unset(&self, key: &str) {
        self.values.borrow_mut().remove(key);
    }

    pub fn fail_on(&self, key: &str) {
        self.failing.borrow_mut().insert(key.to_string());
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.failing.borrow().contains(key) {
            bail!("write to {key} rejected");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

impl Setting {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SettingState {
    pub key: String,
    pub value: String,
}

impl Resource for Setting {
    type State = SettingState;
    type Conn = Store;

    fn address(&self) -> String {
        format!("setting.{}", self.key)
    }

    fn resource_type(&self) -> &'static str {
        "setting"
    }

    fn description(&self) -> String {
        format!("{} = {}", self.key, self.value)
    }

    fn materialize(&self, store: &Store) -> Result<SettingState> {
        store.check(&self.key)?;
        store.set(&self.key, &self.value);
        Ok(SettingState {
            key: self.key.clone(),
            value: self.value.clone(),
        })
    }

    fn import(&self, store: &Store) -> Result<Option<SettingState>> {
        Ok(store.get(&self.key).map(|value| SettingState {
            key: self.key.clone(),
            value,
        }))
    }

    fn diff(&self, state: &SettingState) -> Diff {
        if state.key != self.key {
            Diff::Replace {
                attributes: vec!["key".into()],
            }
        } else if state.value != self.value {
            Diff::Update {
                attributes: vec!["value".into()],
            }
        } else {
            Diff::NoChange
        }
    }

    fn converge(&self, _state: &SettingState, store: &Store) -> Result<SettingState> {
        self.materialize(store)
    }
}

impl Observed for SettingState {
    type Conn = Store;

    fn resource_type(&self) -> &'static str {
        "setting"
    }

    fn summary(&self) -> String {
        format!("{} = {}", self.key, self.value)
    }

    fn refresh(&self, store: &Store) -> Result<Refresh<Self>> {
        Ok(match store.get(&self.key) {
            Some(value) => Refresh::Present(Self {
                key: self.key.clone(),
                value,
            }),
            None => Refresh::Absent,
        })
    }

    fn dematerialize(&self, store: &Store) -> Result<()> {
        store.check(&self.key)?;
        store.unset(&self.key);
        Ok(())
    }
}
