//! SwitchHosts import
//!
//! Two export layouts are understood:
//!
//! - v3: `{ "list": [item, ...] }`, content inline on each item
//! - v4: `{ "data": { "list": { "tree": [item, ...] },
//!   "collection": { "hosts": { "data": [{ "id", "content" }] } } } }`
//!
//! Items nest through `children` (folders and groups). A leaf becomes a
//! profile when it has a title; remote leaves carry `url` and
//! `refresh_interval` (seconds). Anything else is skipped on its own.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{HostlyError, Result};
use crate::profile::{NewProfile, ProfileStore};
use crate::profile_metadata::ProfileSource;
use crate::remote::validate_source_url;

/// Content stored apart from the tree (v4), keyed by item id
type ContentIndex<'a> = HashMap<&'a str, &'a str>;

/// Map an export to new profiles, in document order
pub fn parse_switchhosts(json: &str) -> Result<Vec<NewProfile>> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| HostlyError::invalid_format(format!("Invalid JSON: {}", e)))?;

    let (items, contents) = locate_items(&value).ok_or_else(|| {
        HostlyError::invalid_format("Not a SwitchHosts export: no host list found")
    })?;

    let mut out = Vec::new();
    collect(items, &contents, &mut out);
    Ok(out)
}

/// Import an export into the store. Returns the number of profiles created.
pub fn import_switchhosts(store: &mut ProfileStore, json: &str) -> Result<usize> {
    let profiles = parse_switchhosts(json)?;
    if profiles.is_empty() {
        return Ok(0);
    }
    let ids = store.append(profiles)?;
    log::info!("Imported {} profiles from SwitchHosts", ids.len());
    Ok(ids.len())
}

fn locate_items(value: &Value) -> Option<(&Vec<Value>, ContentIndex<'_>)> {
    if let Some(list) = value.get("list").and_then(Value::as_array) {
        return Some((list, HashMap::new()));
    }

    let data = value.get("data")?;
    let tree = data
        .pointer("/list/tree")
        .and_then(Value::as_array)?;

    let contents = data
        .pointer("/collection/hosts/data")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| {
                    let id = e.get("id")?.as_str()?;
                    let content = e.get("content")?.as_str()?;
                    Some((id, content))
                })
                .collect::<ContentIndex<'_>>()
        })
        .unwrap_or_default();

    Some((tree, contents))
}

fn collect(items: &[Value], contents: &ContentIndex<'_>, out: &mut Vec<NewProfile>) {
    for item in items {
        let Some(item) = item.as_object() else {
            log::debug!("Skipping non-object SwitchHosts item");
            continue;
        };

        if let Some(children) = item.get("children").and_then(Value::as_array) {
            collect(children, contents, out);
            continue;
        }

        match kind(item) {
            // Folders without children and reference groups carry no hosts text
            "folder" | "group" => continue,
            _ => {}
        }

        match to_profile(item, contents) {
            Some(profile) => out.push(profile),
            None => log::debug!("Skipping malformed SwitchHosts item {:?}", item.get("id")),
        }
    }
}

fn kind(item: &Map<String, Value>) -> &str {
    item.get("type").and_then(Value::as_str).unwrap_or("local")
}

fn to_profile(item: &Map<String, Value>, contents: &ContentIndex<'_>) -> Option<NewProfile> {
    let name = item
        .get("title")
        .or_else(|| item.get("name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())?;

    let active = item
        .get("on")
        .or_else(|| item.get("enabled"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let is_remote =
        kind(item) == "remote" || item.get("where").and_then(Value::as_str) == Some("remote");

    let source = if is_remote {
        let url = item.get("url").and_then(Value::as_str)?;
        if let Err(e) = validate_source_url(url) {
            log::debug!("Skipping SwitchHosts item {}: {}", name, e);
            return None;
        }
        let interval = item.get("refresh_interval").and_then(Value::as_u64);
        match ProfileSource::from_parts(Some(url.to_string()), interval) {
            ProfileSource::Local => return None,
            remote => remote,
        }
    } else {
        ProfileSource::Local
    };

    let content = item
        .get("content")
        .and_then(Value::as_str)
        .or_else(|| {
            let id = item.get("id")?.as_str()?;
            contents.get(id).copied()
        })
        .unwrap_or_default();

    Some(NewProfile {
        name: name.to_string(),
        content: content.to_string(),
        active,
        source,
        last_update: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreSettings;
    use crate::hosts::SystemHostsWriter;
    use std::fs;
    use tempfile::TempDir;

    fn open_store(tmp: &TempDir) -> ProfileStore {
        let hosts = tmp.path().join("hosts");
        fs::write(&hosts, "").unwrap();
        let writer = SystemHostsWriter::new(hosts);
        let settings = StoreSettings {
            default_profiles: Vec::new(),
        };
        let mut store = ProfileStore::open(tmp.path().join("base"), &settings, &writer).unwrap();
        for profile in store.list() {
            store.remove(&profile.id).unwrap();
        }
        store
    }

    #[test]
    fn test_skips_malformed_entries() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);
        store.create("Existing", None, ProfileSource::Local).unwrap();

        let json = r#"{"list": [
            {"id": "1", "title": "Dev", "content": "10.0.0.1 dev", "on": false},
            {"id": "2", "content": "no title"},
            {"id": "3", "title": "Prod", "content": "10.0.0.9 prod"}
        ]}"#;

        assert_eq!(import_switchhosts(&mut store, json).unwrap(), 2);
        let names: Vec<_> = store.list().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Existing", "Dev", "Prod"]);
    }

    #[test]
    fn test_nested_folders_and_remote_items() {
        let json = r#"{"list": [
            {"id": "f", "title": "Work", "type": "folder", "children": [
                {"id": "a", "title": "API", "content": "10.0.0.1 api", "on": true},
                {"id": "g", "title": "Inner", "type": "folder", "children": [
                    {"id": "r", "title": "Ads", "type": "remote",
                     "url": "https://example.com/hosts", "refresh_interval": 3600}
                ]}
            ]},
            {"id": "ref", "title": "Combined", "type": "group", "include": ["a"]},
            {"id": "bad", "title": "Broken remote", "where": "remote"},
            "not an object"
        ]}"#;

        let profiles = parse_switchhosts(json).unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].name, "API");
        assert!(profiles[0].active);
        assert_eq!(
            profiles[1].source,
            ProfileSource::Remote {
                url: "https://example.com/hosts".to_string(),
                interval: Some(3600),
            }
        );
        assert!(!profiles[1].active);
    }

    #[test]
    fn test_v4_layout_with_separate_contents() {
        let json = r#"{
            "version": [4, 0, 0, 0],
            "data": {
                "list": {"tree": [
                    {"id": "x1", "title": "Local", "type": "local", "on": true},
                    {"id": "x2", "title": "Remote", "type": "remote",
                     "url": "http://h/r", "on": false}
                ]},
                "collection": {"hosts": {"data": [
                    {"id": "x1", "content": "127.0.0.1 local.test"},
                    {"id": "x2", "content": "0.0.0.0 cached"}
                ]}}
            }
        }"#;

        let profiles = parse_switchhosts(json).unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].content, "127.0.0.1 local.test");
        assert_eq!(profiles[1].content, "0.0.0.0 cached");
        assert_eq!(profiles[1].source.interval(), None);
    }

    #[test]
    fn test_enabled_items_follow_selection_mode() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);
        let json = r#"{"list": [
            {"title": "A", "content": "a", "on": true},
            {"title": "B", "content": "b", "enabled": true}
        ]}"#;

        assert_eq!(import_switchhosts(&mut store, json).unwrap(), 2);
        let active: Vec<_> = store
            .list()
            .into_iter()
            .filter(|p| p.active)
            .map(|p| p.name)
            .collect();
        assert_eq!(active, vec!["B"]);
    }

    #[test]
    fn test_unrecognised_input_is_invalid_format() {
        for bad in ["{", "[]", r#"{"hosts": []}"#, r#"{"data": {"list": {}}}"#] {
            assert!(
                matches!(parse_switchhosts(bad), Err(HostlyError::InvalidFormat { .. })),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_remote_items_need_http_urls() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);

        let json = r#"{"list": [
            {"id": "1", "title": "Ads", "type": "remote", "url": "https://h/ads"},
            {"id": "2", "title": "Mirror", "type": "remote", "url": "ftp://h/hosts"},
            {"id": "3", "title": "Dev", "content": "10.0.0.1 dev"}
        ]}"#;

        assert_eq!(import_switchhosts(&mut store, json).unwrap(), 2);
        let names: Vec<_> = store.list().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Ads", "Dev"]);
    }

    #[test]
    fn test_empty_list_imports_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);
        assert_eq!(import_switchhosts(&mut store, r#"{"list": []}"#).unwrap(), 0);
        assert!(store.list().is_empty());
    }
}
