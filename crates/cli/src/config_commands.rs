//! `gridway config` and `gridway doctor`.

use {anyhow::Context, clap::Subcommand, serde_json::Value};

use gridway_config::{GridwayConfig, discover_and_load, loader, save_config};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the resolved configuration, or one key of it.
    Get { key: Option<String> },
    /// Set a key (dotted path) to a value and save.
    Set { key: String, value: String },
    /// Print the path the configuration is loaded from.
    Path,
}

pub fn run(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = discover_and_load();
            let value = serde_json::to_value(&config)?;
            match key {
                None => println!("{}", toml::to_string_pretty(&config)?),
                Some(key) => {
                    let found = lookup_path(&value, &key)
                        .with_context(|| format!("no such config key: {key}"))?;
                    println!("{found}");
                },
            }
            Ok(())
        },
        ConfigAction::Set { key, value } => {
            let config = discover_and_load();
            let mut tree = serde_json::to_value(&config)?;
            set_path(&mut tree, &key, &value)?;
            let updated: GridwayConfig =
                serde_json::from_value(tree).context("value does not fit the config schema")?;
            let path = save_config(&updated)?;
            println!("saved {}", path.display());
            Ok(())
        },
        ConfigAction::Path => {
            println!("{}", loader::find_or_default_config_path().display());
            Ok(())
        },
    }
}

pub fn doctor() -> anyhow::Result<()> {
    let config = discover_and_load();
    let mut problems = 0usize;

    if config.viewer.path.is_none() {
        println!("warn: no viewer path configured (viewer.path)");
        problems += 1;
    } else if let Some(path) = &config.viewer.path
        && !std::path::Path::new(path).exists()
    {
        println!("error: viewer.path does not exist: {path}");
        problems += 1;
    }

    for (name, url) in [
        ("services.user", &config.services.user),
        ("services.inventory", &config.services.inventory),
        ("services.asset", &config.services.asset),
        ("services.grid", &config.services.grid),
    ] {
        if let Some(url) = url
            && !url.starts_with("http://")
            && !url.starts_with("https://")
        {
            println!("error: {name} is not an http(s) URL: {url}");
            problems += 1;
        }
    }

    if config.login.port == 0 {
        println!("error: login.port must be non-zero");
        problems += 1;
    }

    if problems == 0 {
        println!("configuration ok");
    } else {
        println!("{problems} problem(s) found");
    }
    Ok(())
}

fn lookup_path<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(value, |v, part| v.get(part))
}

fn set_path(tree: &mut Value, key: &str, raw: &str) -> anyhow::Result<()> {
    let mut current = tree;
    let parts: Vec<&str> = key.split('.').collect();
    let (last, parents) = parts.split_last().context("empty key")?;
    for part in parents {
        current = current
            .get_mut(*part)
            .with_context(|| format!("no such config section: {part}"))?;
    }
    let object = current
        .as_object_mut()
        .with_context(|| format!("{key} is not settable"))?;

    // Accept JSON literals (numbers, booleans, arrays); fall back to string.
    let parsed = serde_json::from_str(raw).unwrap_or(Value::String(raw.to_string()));
    object.insert((*last).to_string(), parsed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_dotted_paths() {
        let v = serde_json::json!({ "login": { "port": 8080 } });
        assert_eq!(lookup_path(&v, "login.port"), Some(&serde_json::json!(8080)));
        assert!(lookup_path(&v, "login.missing").is_none());
    }

    #[test]
    fn set_accepts_json_literals_and_strings() {
        let mut v = serde_json::json!({ "login": { "port": 8080, "bind": "127.0.0.1" } });
        set_path(&mut v, "login.port", "9999").unwrap();
        set_path(&mut v, "login.bind", "0.0.0.0").unwrap();
        assert_eq!(v["login"]["port"], 9999);
        assert_eq!(v["login"]["bind"], "0.0.0.0");
    }
}
