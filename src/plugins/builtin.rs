// Built-in handlers shipped with the gateway. Sample manifests under
// `plugins/` expose them; deployments may link additional handlers into the
// catalog at startup.

use std::time::Duration;

use anyhow::{Context, anyhow};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use super::catalog::HandlerCatalog;
use super::{HandlerArgs, HandlerOutput, NativeValue};

pub fn register_all(catalog: &mut HandlerCatalog) {
    catalog
        .register("text.echo", echo)
        .register("text.analyze", analyze_text)
        .register("text.summarize", summarize_text)
        .register("demo.slow_job", slow_job)
        .register("image.inspect", inspect_image)
        .register("file.checksum", file_checksum);
}

fn required_str<'a>(args: &'a HandlerArgs, name: &str) -> anyhow::Result<&'a str> {
    args.str(name).ok_or_else(|| anyhow!("{} must be a string", name))
}

pub fn echo(args: HandlerArgs) -> anyhow::Result<HandlerOutput> {
    let text = required_str(&args, "text")?;
    Ok(HandlerOutput::named([("echoed", NativeValue::Json(Value::from(text)))]))
}

/// Sleeps for `delay_ms` (default 200) and answers 42.
pub fn slow_job(args: HandlerArgs) -> anyhow::Result<HandlerOutput> {
    let delay = args.u64("delay_ms").unwrap_or(200);
    std::thread::sleep(Duration::from_millis(delay));
    Ok(HandlerOutput::named([("n", NativeValue::Json(json!(42)))]))
}

// ── text ────────────────────────────────────────────────────────────────────

const POSITIVE: &[&str] = &["good", "great", "excellent", "happy", "love", "nice", "wonderful", "best"];
const NEGATIVE: &[&str] = &["bad", "terrible", "awful", "sad", "hate", "poor", "worst", "horrible"];

fn sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
}

pub fn analyze_text(args: HandlerArgs) -> anyhow::Result<HandlerOutput> {
    let text = required_str(&args, "text")?;
    let include_sentiment = args.bool("include_sentiment").unwrap_or(true);

    let word_list: Vec<String> = words(text).collect();
    let mut analysis = json!({
        "char_count": text.chars().count(),
        "word_count": word_list.len(),
        "sentence_count": sentences(text).len(),
    });

    if include_sentiment {
        let pos = word_list.iter().filter(|w| POSITIVE.contains(&w.as_str())).count() as i64;
        let neg = word_list.iter().filter(|w| NEGATIVE.contains(&w.as_str())).count() as i64;
        let label = match pos - neg {
            d if d > 0 => "positive",
            d if d < 0 => "negative",
            _ => "neutral",
        };
        analysis["sentiment"] = json!({ "positive": pos, "negative": neg, "label": label });
    }

    Ok(HandlerOutput::Positional(vec![NativeValue::Json(analysis)]))
}

/// Keeps the first `max_sentences` sentences.
pub fn summarize_text(args: HandlerArgs) -> anyhow::Result<HandlerOutput> {
    let text = required_str(&args, "text")?;
    let max = args.u64("max_sentences").unwrap_or(3).max(1) as usize;
    let all = sentences(text);
    let summary = all.iter().take(max).map(|s| format!("{}.", s)).collect::<Vec<_>>().join(" ");
    Ok(HandlerOutput::Positional(vec![
        NativeValue::Json(Value::from(summary)),
        NativeValue::Json(json!(all.len())),
    ]))
}

// ── binary ──────────────────────────────────────────────────────────────────

fn sniff_format(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "png",
        [0xFF, 0xD8, 0xFF, ..] => "jpeg",
        [b'G', b'I', b'F', b'8', ..] => "gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "webp",
        [b'B', b'M', ..] => "bmp",
        _ => "unknown",
    }
}

/// Returns the image unchanged alongside its sniffed format and size.
pub fn inspect_image(args: HandlerArgs) -> anyhow::Result<HandlerOutput> {
    let bytes = args.bytes("image").context("image must be a decoded buffer")?;
    Ok(HandlerOutput::Positional(vec![
        NativeValue::Bytes(bytes.to_vec()),
        NativeValue::Json(Value::from(sniff_format(bytes))),
        NativeValue::Json(json!(bytes.len())),
    ]))
}

pub fn file_checksum(args: HandlerArgs) -> anyhow::Result<HandlerOutput> {
    let path = args.path("file").context("file must be a decoded temporary file")?;
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let digest = hex::encode(Sha256::digest(&data));
    Ok(HandlerOutput::named([
        ("sha256", NativeValue::Json(Value::from(digest))),
        ("size_bytes", NativeValue::Json(json!(data.len()))),
    ]))
}
