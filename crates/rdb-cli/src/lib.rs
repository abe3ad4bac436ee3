#![warn(missing_docs)]
//! Shared flags and operations for the `rdbls`/`rdbcat`/`rdbput`/`rdbrm`/
//! `rdbtest` family of binaries (`spec.md` §6: "a family of binaries
//! sharing flags ..., dispatching by argv\[0\] ... Exit 1 on user error, 0
//! on success").

use std::collections::BTreeMap;
use std::io::{Read, Write};

use anyhow::{Context, Result, ensure};
use base64::Engine as _;
use clap::Parser;
use rdb_client::Cluster;
use rdb_codec::Value;

/// Flags shared by every binary in this family.
#[derive(Parser, Debug)]
#[command(version)]
pub struct Opts {
    /// Address of the server, e.g. "localhost" or "localhost:6552". May
    /// also hold a weighted multi-node spec
    /// "server:port,weight;server:port,weight".
    #[arg(short = 's', long, env = "RDB_SERVER", default_value = "localhost:6552")]
    pub server: String,

    /// Print JSON instead of plain text.
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Print a newline between multiple non-JSON values (the default).
    #[arg(short = 'n', long = "newlines")]
    pub newlines: bool,

    /// Don't print a newline between multiple non-JSON values.
    #[arg(short = 'r', long = "nonewlines")]
    pub nonewlines: bool,

    /// Keys to operate on.
    pub keys: Vec<String>,
}

impl Opts {
    /// Whether output should be newline-separated (the default, unless
    /// `-r`/`--nonewlines` was given).
    pub fn use_newlines(&self) -> bool {
        !self.nonewlines
    }
}

/// Print `message` to stderr and exit with status 1, matching every
/// original command's behaviour on a user error.
pub fn cmd_error(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn key_bytes(key: &str) -> Vec<u8> {
    key.as_bytes().to_vec()
}

/// Python-style truthiness of a decoded value: `None`/`0`/`""`/empty
/// collections/`False` are falsy, everything else is truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Blob(bytes) => !bytes.is_empty(),
        Value::Json(json) => match json {
            serde_json::Value::Null => false,
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::Number(n) => n.as_f64().is_none_or(|f| f != 0.0),
            serde_json::Value::String(s) => !s.is_empty(),
            serde_json::Value::Array(a) => !a.is_empty(),
            serde_json::Value::Object(o) => !o.is_empty(),
        },
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Json(j) => j.clone(),
        Value::Blob(bytes) => {
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
    }
}

/// Render a value the way a plain-text, non-JSON `cat` would: a JSON
/// string prints unquoted, everything else prints as JSON text.
fn render_value(value: &Value) -> String {
    match value {
        Value::Json(serde_json::Value::String(s)) => s.clone(),
        Value::Json(j) => j.to_string(),
        Value::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// `rdbls`: with keys given, list which of them have a truthy value;
/// with none, list every key in the store (single-node specs only).
pub async fn cmd_ls(opts: &Opts) -> Result<()> {
    let cluster = Cluster::from_spec(&opts.server).context("build cluster client")?;

    let result_keys: Vec<String> = if !opts.keys.is_empty() {
        let byte_keys: Vec<Vec<u8>> = opts.keys.iter().map(|k| key_bytes(k)).collect();
        let values = cluster.get_multi(&byte_keys).await?;
        opts.keys
            .iter()
            .filter(|k| values.get(k.as_bytes()).is_some_and(is_truthy))
            .cloned()
            .collect()
    } else {
        cluster
            .all_keys()
            .await?
            .into_iter()
            .map(|k| String::from_utf8_lossy(&k).into_owned())
            .collect()
    };

    if opts.json {
        println!("{}", serde_json::to_string(&result_keys)?);
    } else {
        for key in &result_keys {
            println!("{key}");
        }
    }
    Ok(())
}

/// `rdbcat`: print the value(s) for one or more keys.
pub async fn cmd_cat(opts: &Opts) -> Result<()> {
    if opts.keys.is_empty() {
        cmd_error("no keys specified");
    }
    let cluster = Cluster::from_spec(&opts.server).context("build cluster client")?;

    // We could just always use get_multi, but exercising both paths keeps
    // parity with testing every available method.
    let values: Vec<(String, Value)> = if opts.keys.len() == 1 {
        let v = cluster.get(opts.keys[0].as_bytes()).await?;
        vec![(opts.keys[0].clone(), v)]
    } else {
        let byte_keys: Vec<Vec<u8>> = opts.keys.iter().map(|k| key_bytes(k)).collect();
        let found = cluster.get_multi(&byte_keys).await?;
        opts.keys
            .iter()
            .filter_map(|k| found.get(k.as_bytes()).map(|v| (k.clone(), v.clone())))
            .collect()
    };

    if opts.json {
        let obj: serde_json::Map<String, serde_json::Value> = values
            .into_iter()
            .map(|(k, v)| (k, value_to_json(&v)))
            .collect();
        println!("{}", serde_json::to_string(&serde_json::Value::Object(obj))?);
    } else if opts.use_newlines() {
        for (_, v) in &values {
            println!("{}", render_value(v));
        }
    } else {
        let mut out = std::io::stdout();
        for (_, v) in &values {
            write!(out, "{}", render_value(v))?;
        }
        out.flush()?;
    }
    Ok(())
}

/// `rdbput`: store stdin's contents under exactly one key.
pub async fn cmd_put(opts: &Opts) -> Result<()> {
    if opts.keys.len() != 1 {
        cmd_error("can only PUT one key at a time");
    }
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("read stdin")?;

    let cluster = Cluster::from_spec(&opts.server).context("build cluster client")?;
    let value = Value::Json(serde_json::Value::String(input));
    cluster.put(opts.keys[0].as_bytes(), &value).await?;
    Ok(())
}

/// `rdbrm`: delete one or more keys.
pub async fn cmd_rm(opts: &Opts) -> Result<()> {
    if opts.keys.is_empty() {
        cmd_error("no keys specified");
    }
    let cluster = Cluster::from_spec(&opts.server).context("build cluster client")?;
    for key in &opts.keys {
        cluster.delete(key.as_bytes()).await?;
    }
    Ok(())
}

/// `rdbtest`: exercises every client operation against two or more
/// throwaway keys, destroying their contents along the way.
pub async fn cmd_test(opts: &Opts) -> Result<()> {
    if opts.keys.len() < 2 {
        cmd_error("need at least two keys that I can play with. note that I'll destroy them");
    }
    let keys = &opts.keys;
    let cluster = Cluster::from_spec(&opts.server).context("build cluster client")?;

    println!("put_multi");
    let mut values: BTreeMap<Vec<u8>, Value> = BTreeMap::new();
    for key in keys {
        values.insert(key_bytes(key), Value::Json(serde_json::Value::String(key.clone())));
    }
    cluster.put_multi(&values).await?;

    println!("get_multi");
    let byte_keys: Vec<Vec<u8>> = keys.iter().map(|k| key_bytes(k)).collect();
    let got = cluster.get_multi(&byte_keys).await?;
    for key in keys {
        let expected = Value::Json(serde_json::Value::String(key.clone()));
        ensure!(
            got.get(key.as_bytes()) == Some(&expected),
            "get_multi returned an unexpected value for key {key:?}"
        );
    }

    let testval = Value::Json(serde_json::Value::String("a new value!".to_string()));
    for key in keys {
        println!("put {key}");
        cluster.put(key.as_bytes(), &testval).await?;
        println!("get {key}");
        let got = cluster.get(key.as_bytes()).await?;
        ensure!(got == testval, "put/get round trip failed for key {key:?}");
        println!("del {key}");
        cluster.delete(key.as_bytes()).await?;
    }

    println!("test unicode");
    let unicode = "bacon\u{A000}abcd\u{7B4}".to_string();
    let unicode_val = Value::Json(serde_json::Value::String(unicode));
    cluster.put(keys[0].as_bytes(), &unicode_val).await?;
    let got = cluster.get(keys[0].as_bytes()).await?;
    ensure!(got == unicode_val, "unicode round trip failed");
    let mut values = BTreeMap::new();
    values.insert(key_bytes(&keys[0]), unicode_val.clone());
    values.insert(key_bytes(&keys[1]), unicode_val.clone());
    cluster.put_multi(&values).await?;
    let got = cluster
        .get_multi(&[key_bytes(&keys[0]), key_bytes(&keys[1])])
        .await?;
    for key in &keys[..2] {
        ensure!(
            got.get(key.as_bytes()) == Some(&unicode_val),
            "unicode round trip failed in put_multi/get_multi for key {key:?}"
        );
    }

    println!("json objects");
    let obj = Value::Json(serde_json::json!({"a": 1, "b": 2}));
    cluster.put(keys[0].as_bytes(), &obj).await?;
    let got = cluster.get(keys[0].as_bytes()).await?;
    ensure!(got == obj, "json object round trip failed");
    let mut values = BTreeMap::new();
    values.insert(key_bytes(&keys[0]), obj.clone());
    values.insert(key_bytes(&keys[1]), obj.clone());
    cluster.put_multi(&values).await?;
    let got = cluster
        .get_multi(&[key_bytes(&keys[0]), key_bytes(&keys[1])])
        .await?;
    for key in &keys[..2] {
        ensure!(
            got.get(key.as_bytes()) == Some(&obj),
            "json object round trip failed in put_multi/get_multi for key {key:?}"
        );
    }

    println!("blob objects");
    let blob = Value::Blob(b"bacon".to_vec());
    cluster.put(keys[0].as_bytes(), &blob).await?;
    let got = cluster.get(keys[0].as_bytes()).await?;
    ensure!(got == blob, "blob round trip failed");
    let mut values = BTreeMap::new();
    values.insert(key_bytes(&keys[0]), blob.clone());
    values.insert(key_bytes(&keys[1]), blob.clone());
    cluster.put_multi(&values).await?;
    let got = cluster
        .get_multi(&[key_bytes(&keys[0]), key_bytes(&keys[1])])
        .await?;
    for key in &keys[..2] {
        ensure!(
            got.get(key.as_bytes()) == Some(&blob),
            "blob round trip failed in put_multi/get_multi for key {key:?}"
        );
    }

    println!("cleanup");
    cluster.delete_multi(&byte_keys).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falsy_json_scalars_are_falsy() {
        assert!(!is_truthy(&Value::Json(serde_json::Value::Null)));
        assert!(!is_truthy(&Value::Json(serde_json::json!(false))));
        assert!(!is_truthy(&Value::Json(serde_json::json!(0))));
        assert!(!is_truthy(&Value::Json(serde_json::json!(""))));
        assert!(!is_truthy(&Value::Json(serde_json::json!([]))));
        assert!(!is_truthy(&Value::Json(serde_json::json!({}))));
    }

    #[test]
    fn truthy_json_scalars_are_truthy() {
        assert!(is_truthy(&Value::Json(serde_json::json!(true))));
        assert!(is_truthy(&Value::Json(serde_json::json!(1))));
        assert!(is_truthy(&Value::Json(serde_json::json!("bacon"))));
        assert!(is_truthy(&Value::Json(serde_json::json!([1]))));
        assert!(is_truthy(&Value::Json(serde_json::json!({"a": 1}))));
    }

    #[test]
    fn blob_truthiness_is_based_on_length() {
        assert!(!is_truthy(&Value::Blob(vec![])));
        assert!(is_truthy(&Value::Blob(vec![0])));
    }

    #[test]
    fn plain_text_rendering_unquotes_json_strings() {
        assert_eq!(
            render_value(&Value::Json(serde_json::json!("bacon"))),
            "bacon"
        );
        assert_eq!(render_value(&Value::Json(serde_json::json!(1))), "1");
        assert_eq!(render_value(&Value::Blob(b"bacon".to_vec())), "bacon");
    }

    #[test]
    fn json_rendering_base64_encodes_blobs() {
        assert_eq!(
            value_to_json(&Value::Blob(b"bacon".to_vec())),
            serde_json::json!("YmFjb24=")
        );
        assert_eq!(
            value_to_json(&Value::Json(serde_json::json!("bacon"))),
            serde_json::json!("bacon")
        );
    }

    #[test]
    fn use_newlines_defaults_true_and_flips_with_nonewlines() {
        let opts = Opts {
            server: "localhost".to_string(),
            json: false,
            newlines: false,
            nonewlines: false,
            keys: vec![],
        };
        assert!(opts.use_newlines());
        let opts = Opts {
            nonewlines: true,
            ..opts
        };
        assert!(!opts.use_newlines());
    }
}
