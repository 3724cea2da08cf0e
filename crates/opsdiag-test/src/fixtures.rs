//! Mapping fixtures shaped like a switch image's `/etc` files.

use std::path::Path;

use crate::error::Result;

/// Diag-dump feature mapping: `lldp`, `lacp` and `ucast-routing` capture,
/// `fan` does not, and `lacp` is declared twice; the first declaration wins.
pub const FEATURE_MAPPING: &str = r#"---
  -
    feature_name: "lldp"
    feature_desc: "Link Layer Discovery Protocol"
    daemon:
     - [name: "ops-lldpd", "diag_dump":"y"]
  -
    feature_name: "lacp"
    feature_desc: "Link Aggregation Control Protocol"
    daemon:
     - [name: "ops-lacpd", "diag_dump":"y"]
  -
    feature_name: "ucast-routing"
    feature_desc: "Unicast routing"
    daemon:
     - [name: "ops-zebra", "diag_dump":"y"]
     - [name: "ops-bgpd", "diag_dump":"y"]
  -
    feature_name: "fan"
    feature_desc: "Fan"
    daemon:
     - [name: "ops-fand", "diag_dump":"n"]
  -
    feature_name: "lacp"
    feature_desc: "Link Aggregation Control Protocol"
    daemon:
     - [name: "ops-lacpd", "diag_dump":"y"]
"#;

/// Show tech mapping. Every command resolves locally so runs do not need
/// an external CLI; `show testing` is unknown everywhere and its block is
/// repeated.
pub const SHOWTECH_MAPPING: &str = r#"---
  feature:
  -
    feature_desc: "Version"
    feature_name: version
    cli_cmds:
      - "show version"
  -
    feature_desc: "Link Layer Discovery Protocol"
    feature_name: lldp
    cli_cmds:
      - "show events category lldp"
    sub_feature:
    -
      sub_feature_name: vlog
      sub_feature_desc: "LLDP log levels"
      cli_cmds:
        - "show vlog config feature lldp"
  -
    feature_desc: "Link Aggregation"
    feature_name: LAG
    cli_cmds:
      - "show vlog config feature lacp"
  -
    feature_desc: "Supportability"
    feature_name: supportability
    cli_cmds:
      - "show core-dump"
      - "show logging"
  -
    feature_desc: "Test Feature"
    feature_name: test1234
    cli_cmds:
      - "show testing"
  -
    feature_desc: "Test Feature"
    feature_name: test1234
    cli_cmds:
      - "show testing"
"#;

/// Writes `text` to `path`, creating parent directories.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_mapping(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdiag_core::{FeatureTable, MappingSources};

    #[test]
    fn test_fixtures_parse() {
        let dir = tempfile::tempdir().unwrap();
        let sources = MappingSources {
            feature_mapping: dir.path().join("etc/ops_featuremapping.yaml"),
            showtech_mapping: dir.path().join("etc/ops_showtech.yaml"),
        };
        write_mapping(&sources.feature_mapping, FEATURE_MAPPING).unwrap();
        write_mapping(&sources.showtech_mapping, SHOWTECH_MAPPING).unwrap();

        let table = FeatureTable::load(&sources).unwrap();
        assert!(table.lookup("lldp").is_ok());
        assert!(table.lookup("ucast-routing").is_ok());
        assert_eq!(table.lookup("ucast-routing").unwrap().daemons.len(), 2);
        assert_eq!(table.showtech_entries("lldp").len(), 1);
        assert_eq!(table.showtech().len(), 6);
        assert_eq!(table.list().len(), 4);
    }
}
