use crate::commands::Out;
use crate::error::{self, ErrorType, IntoResult};
use crate::{store, Config, Result};
use anyhow::Context;
use serde::Serialize;

/// The sheets of the workbook and the one polog writes to.
#[derive(Debug, Clone, Serialize)]
pub struct SheetList {
    pub names: Vec<String>,
    pub selected: String,
}

/// Lists the sheets of the workbook, marking the one that `add` and `search` use by default.
pub fn sheets(config: &Config) -> Result<Out<SheetList>> {
    sheets_inner(config)
        .context("Unable to list the sheets of the workbook")
        .pub_result(ErrorType::Workbook)
}

fn sheets_inner(config: &Config) -> anyhow::Result<Out<SheetList>> {
    let path = config.workbook_path();
    if !path.is_file() {
        return Err(error::not_found(format!(
            "The workbook '{}' does not exist",
            path.display()
        )));
    }
    let names = store::sheet_names(path)?;
    let selected = store::resolve_sheet(path, config.sheet_name())?;
    let lines: Vec<String> = names
        .iter()
        .map(|name| {
            if name.eq_ignore_ascii_case(&selected) {
                format!("* {name}")
            } else {
                format!("  {name}")
            }
        })
        .collect();
    Ok(Out::new(
        format!(
            "Sheets in '{}':\n{}",
            path.display(),
            lines.join("\n")
        ),
        SheetList { names, selected },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;

    #[test]
    fn test_sheets() {
        let env = TestEnv::new();
        let out = sheets(&env.config()).unwrap();
        let list = out.structure().unwrap();
        assert_eq!(list.names, vec!["PO Log"]);
        assert_eq!(list.selected, "PO Log");
        assert!(out.message().contains("* PO Log"));
    }
}
