use anyhow::{Context as _, Result};
use mssqlkit::Sid;

pub fn run(guid: &str) -> Result<()> {
    let sid = Sid::from_guid(guid).with_context(|| format!("Cannot convert {guid}"))?;
    println!("{sid}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_guid() {
        assert!(run("not-a-guid").is_err());
        assert!(run("cbb9c7db-2777-47b7-8954-0269ae3dc553").is_ok());
    }
}
