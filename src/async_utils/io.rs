//! I/O utilities.
//!
//! Settings files may be JSON or TOML, and reports go to a file or to
//! standard output. We use Tokio's async file APIs, but parse in memory
//! because our parsing libraries don't do async I/O.

use tokio::{
    fs::File,
    io::{AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _},
};

use crate::prelude::*;

/// Is this path a JSON file, judging by its extension?
fn is_json_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

/// Read TOML or JSON from a file.
pub async fn read_json_or_toml<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let mut file = File::open(path)
        .await
        .with_context(|| format!("Failed to open file at path: {:?}", path))?;
    let mut data = String::new();
    file.read_to_string(&mut data)
        .await
        .with_context(|| format!("Failed to read file at path: {:?}", path))?;
    if is_json_path(path) {
        serde_json::from_str(&data).with_context(|| {
            format!("Failed to parse JSON from file at path: {:?}", path)
        })
    } else {
        toml::from_str(&data).with_context(|| {
            format!("Failed to parse TOML from file at path: {:?}", path)
        })
    }
}

/// Create an [`AsyncWrite`] for a file or stdout.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("Failed to create file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write a value as pretty-printed JSON to either standard output or a file.
pub async fn write_json_output<T>(path: Option<&Path>, value: &T) -> Result<()>
where
    T: Serialize,
{
    let json =
        serde_json::to_string_pretty(value).context("Failed to serialize JSON output")?;
    let mut writer = create_writer(path).await?;
    writer
        .write_all(json.as_bytes())
        .await
        .context("Failed to write JSON to output")?;
    writer
        .write_all(b"\n")
        .await
        .context("Failed to write newline to output")?;
    writer.flush().await.context("Failed to flush output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Example {
        pages: u32,
        name: String,
    }

    #[tokio::test]
    async fn reads_json_and_toml() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("io-test")?;
        let json_path = dir.path().join("example.json");
        fs::write(&json_path, r#"{"pages": 3, "name": "book"}"#)?;
        let toml_path = dir.path().join("example.toml");
        fs::write(&toml_path, "pages = 3\nname = \"book\"\n")?;

        let expected = Example {
            pages: 3,
            name: "book".to_owned(),
        };
        assert_eq!(read_json_or_toml::<Example>(&json_path).await?, expected);
        assert_eq!(read_json_or_toml::<Example>(&toml_path).await?, expected);
        Ok(())
    }

    #[tokio::test]
    async fn reports_parse_errors_with_path() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("io-test")?;
        let path = dir.path().join("broken.toml");
        fs::write(&path, "pages = [")?;
        let err = read_json_or_toml::<Example>(&path).await.unwrap_err();
        assert!(format!("{err:#}").contains("broken.toml"));
        Ok(())
    }

    #[tokio::test]
    async fn writes_pretty_json() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("io-test")?;
        let path = dir.path().join("out.json");
        write_json_output(Some(&path), &serde_json::json!({"ok": true})).await?;
        let written = fs::read_to_string(&path)?;
        assert_eq!(written, "{\n  \"ok\": true\n}\n");
        Ok(())
    }
}
