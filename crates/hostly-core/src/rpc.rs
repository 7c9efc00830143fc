//! Call-name dispatch for the UI shell.
//!
//! Every call takes a JSON object of camelCase arguments (unknown keys are
//! rejected) and returns a JSON value. Failures cross the boundary as
//! `{ "code": "<taxonomy name>", "message": "..." }`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HostlyError, Result};
use crate::service::Hostly;

/// Every call name [`dispatch`] understands
pub const CALLS: &[&str] = &[
    "load_config",
    "load_common_config",
    "list_profiles",
    "create_profile",
    "rename_profile",
    "toggle_profile_active",
    "delete_profile",
    "set_multi_select",
    "update_remote_config",
    "trigger_profile_update",
    "get_system_hosts",
    "save_system_hosts",
    "save_common_config",
    "save_profile_content",
    "apply_config",
    "export_data",
    "import_data",
    "import_switchhosts",
    "check_write_permission",
];

/// Error object returned to the UI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: String,
    pub message: String,
}

impl From<&HostlyError> for RpcError {
    fn from(err: &HostlyError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Argument schemas
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IdArgs {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CreateProfileArgs {
    name: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    update_interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RenameArgs {
    id: String,
    new_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MultiSelectArgs {
    enable: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RemoteConfigArgs {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    update_interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ContentArgs {
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileContentArgs {
    id: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct JsonContentArgs {
    json_content: String,
}

fn parse_args<T: DeserializeOwned>(call: &str, args: Value) -> Result<T> {
    // Calls without arguments may send nothing at all
    let args = match args {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(args)
        .map_err(|e| HostlyError::invalid_format(format!("Bad arguments for {}: {}", call, e)))
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Run one call against the service
pub fn dispatch(hostly: &Hostly, call: &str, args: Value) -> Result<Value> {
    log::debug!("rpc call: {}", call);

    let result = match call {
        "load_config" => {
            parse_args::<NoArgs>(call, args)?;
            serde_json::to_value(hostly.load_config())?
        }
        "load_common_config" => {
            parse_args::<NoArgs>(call, args)?;
            Value::String(hostly.load_common_config())
        }
        "list_profiles" => {
            parse_args::<NoArgs>(call, args)?;
            serde_json::to_value(hostly.list_profiles())?
        }
        "create_profile" => {
            let a: CreateProfileArgs = parse_args(call, args)?;
            let content = a.content.as_deref();
            let id = hostly.create_profile(&a.name, content, a.url, a.update_interval)?;
            Value::String(id)
        }
        "rename_profile" => {
            let a: RenameArgs = parse_args(call, args)?;
            hostly.rename_profile(&a.id, &a.new_name)?;
            Value::Null
        }
        "toggle_profile_active" => {
            let a: IdArgs = parse_args(call, args)?;
            Value::Bool(hostly.toggle_profile_active(&a.id)?)
        }
        "delete_profile" => {
            let a: IdArgs = parse_args(call, args)?;
            hostly.delete_profile(&a.id)?;
            Value::Null
        }
        "set_multi_select" => {
            let a: MultiSelectArgs = parse_args(call, args)?;
            hostly.set_multi_select(a.enable)?;
            Value::Null
        }
        "update_remote_config" => {
            let a: RemoteConfigArgs = parse_args(call, args)?;
            hostly.update_remote_config(&a.id, a.url, a.update_interval)?;
            Value::Null
        }
        "trigger_profile_update" => {
            let a: IdArgs = parse_args(call, args)?;
            hostly.trigger_profile_update(&a.id)?;
            Value::Null
        }
        "get_system_hosts" => {
            parse_args::<NoArgs>(call, args)?;
            Value::String(hostly.get_system_hosts()?)
        }
        "save_system_hosts" => {
            let a: ContentArgs = parse_args(call, args)?;
            hostly.save_system_hosts(&a.content)?;
            Value::Null
        }
        "save_common_config" => {
            let a: ContentArgs = parse_args(call, args)?;
            hostly.save_common_config(&a.content)?;
            Value::Null
        }
        "save_profile_content" => {
            let a: ProfileContentArgs = parse_args(call, args)?;
            hostly.save_profile_content(&a.id, &a.content)?;
            Value::Null
        }
        "apply_config" => {
            parse_args::<NoArgs>(call, args)?;
            hostly.apply_config()?;
            Value::Null
        }
        "export_data" => {
            parse_args::<NoArgs>(call, args)?;
            Value::String(hostly.export_data()?)
        }
        "import_data" => {
            let a: JsonContentArgs = parse_args(call, args)?;
            hostly.import_data(&a.json_content)?;
            Value::Null
        }
        "import_switchhosts" => {
            let a: JsonContentArgs = parse_args(call, args)?;
            Value::from(hostly.import_switchhosts(&a.json_content)?)
        }
        "check_write_permission" => {
            parse_args::<NoArgs>(call, args)?;
            Value::Bool(hostly.check_write_permission())
        }
        unknown => {
            return Err(HostlyError::invalid_format(format!("Unknown call: {}", unknown)));
        }
    };

    Ok(result)
}

/// [`dispatch`] with the error converted to its wire form
pub fn handle(hostly: &Hostly, call: &str, args: Value) -> std::result::Result<Value, RpcError> {
    dispatch(hostly, call, args).map_err(|e| {
        log::debug!("rpc call {} failed: {}", call, e);
        RpcError::from(&e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::scheduler::testing::FakeFetcher;
    use crate::service::testing::hostly;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_profile_lifecycle_over_rpc() {
        let tmp = TempDir::new().unwrap();
        let hostly = hostly(tmp.path(), FakeFetcher::serving(""));

        let id = dispatch(
            &hostly,
            "create_profile",
            json!({"name": "Dev", "content": "10.0.0.1 api"}),
        )
        .unwrap();
        let id = id.as_str().unwrap().to_string();

        dispatch(&hostly, "rename_profile", json!({"id": id, "newName": "Develop"})).unwrap();
        assert_eq!(
            dispatch(&hostly, "toggle_profile_active", json!({"id": id})).unwrap(),
            json!(true)
        );

        let profiles = dispatch(&hostly, "list_profiles", Value::Null).unwrap();
        assert_eq!(profiles[0]["name"], "Develop");
        assert_eq!(profiles[0]["active"], true);

        let config = dispatch(&hostly, "load_config", json!({})).unwrap();
        assert_eq!(config["active_profile_ids"], json!([id]));

        let hosts = dispatch(&hostly, "get_system_hosts", Value::Null).unwrap();
        assert_eq!(hosts, json!("\n\n### Profile: Develop ###\n10.0.0.1 api\n"));

        dispatch(&hostly, "delete_profile", json!({"id": id})).unwrap();
        assert_eq!(dispatch(&hostly, "list_profiles", Value::Null).unwrap(), json!([]));
    }

    #[test]
    fn test_remote_arguments_are_camel_case() {
        let tmp = TempDir::new().unwrap();
        let hostly = hostly(tmp.path(), FakeFetcher::serving("0.0.0.0 ads"));

        let id = dispatch(
            &hostly,
            "create_profile",
            json!({"name": "Ads", "url": "https://h/ads", "updateInterval": 600}),
        )
        .unwrap();
        let id = id.as_str().unwrap();
        dispatch(&hostly, "trigger_profile_update", json!({"id": id})).unwrap();

        let profile = &hostly.list_profiles()[0];
        assert_eq!(profile.content, "0.0.0.0 ads");
        assert_eq!(profile.source.interval(), Some(600));

        dispatch(&hostly, "update_remote_config", json!({"id": id, "url": null})).unwrap();
        assert!(!hostly.list_profiles()[0].source.is_remote());
    }

    #[test]
    fn test_bad_arguments_are_invalid_format() {
        let tmp = TempDir::new().unwrap();
        let hostly = hostly(tmp.path(), FakeFetcher::serving(""));

        for (call, args) in [
            ("create_profile", json!({})),
            ("create_profile", json!({"name": "x", "update_interval": 5})),
            ("set_multi_select", json!({"enable": "yes"})),
            ("load_config", json!({"verbose": true})),
            ("import_data", json!({"json": "{}"})),
        ] {
            let err = handle(&hostly, call, args).unwrap_err();
            assert_eq!(err.code, "InvalidFormat", "{}", call);
        }
    }

    #[test]
    fn test_errors_carry_taxonomy_code() {
        let tmp = TempDir::new().unwrap();
        let hostly = hostly(tmp.path(), FakeFetcher::serving(""));

        let err = handle(&hostly, "delete_profile", json!({"id": "missing"})).unwrap_err();
        assert_eq!(err.code, "NotFound");
        assert!(err.message.contains("missing"));

        let err = handle(&hostly, "no_such_call", Value::Null).unwrap_err();
        assert_eq!(err.code, "InvalidFormat");

        let err = handle(&hostly, "import_switchhosts", json!({"jsonContent": "{}"})).unwrap_err();
        assert_eq!(err.code, "InvalidFormat");
    }

    #[test]
    fn test_export_import_and_switchhosts_over_rpc() {
        let tmp = TempDir::new().unwrap();
        let hostly = hostly(tmp.path(), FakeFetcher::serving(""));
        dispatch(&hostly, "save_common_config", json!({"content": "# common"})).unwrap();
        assert_eq!(
            dispatch(&hostly, "load_common_config", Value::Null).unwrap(),
            json!("# common")
        );

        let list = r#"{"list":[{"title":"A","content":"a"},{"title":"B","content":"b"}]}"#;
        let count = dispatch(&hostly, "import_switchhosts", json!({"jsonContent": list}))
        .unwrap();
        assert_eq!(count, json!(2));

        let exported = dispatch(&hostly, "export_data", Value::Null).unwrap();
        dispatch(&hostly, "delete_profile", json!({"id": hostly.list_profiles()[0].id})).unwrap();
        assert_eq!(hostly.list_profiles().len(), 1);

        dispatch(&hostly, "import_data", json!({"jsonContent": exported})).unwrap();
        let names: Vec<_> = hostly.list_profiles().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_system_hosts_calls() {
        let tmp = TempDir::new().unwrap();
        let hostly = hostly(tmp.path(), FakeFetcher::serving(""));

        assert_eq!(dispatch(&hostly, "check_write_permission", Value::Null).unwrap(), json!(true));
        dispatch(&hostly, "save_system_hosts", json!({"content": "# manual"})).unwrap();
        assert_eq!(fs::read_to_string(tmp.path().join("hosts")).unwrap(), "# manual");

        dispatch(&hostly, "apply_config", Value::Null).unwrap();
        assert_eq!(fs::read_to_string(tmp.path().join("hosts")).unwrap(), "");
    }

    #[test]
    fn test_every_listed_call_is_dispatched() {
        let tmp = TempDir::new().unwrap();
        let hostly = hostly(tmp.path(), FakeFetcher::serving(""));
        for call in CALLS {
            if let Err(err) = dispatch(&hostly, call, Value::Null) {
                assert!(!err.to_string().contains("Unknown call"), "{}", call);
            }
        }
    }
}
