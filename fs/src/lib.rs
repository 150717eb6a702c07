// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The on-disk xTS layout the planner reads (spec §6):
//!
//! ```text
//! <xtsRoot>/android-<type>/results/<session-dir>/test_result.xml
//! <xtsRoot>/android-<type>/testcases/<module>.config
//! <xtsRoot>/android-<type>/tools/device_configurations.textproto
//! ```

use std::path::{Path, PathBuf};

/// A directory literally named this is skipped when scanning `results/` (spec §6).
const SKIPPED_RESULT_DIR: &str = "latest";

/// A view onto a single `android-<type>` subtree of an xTS root.
#[derive(Clone, Debug)]
pub struct XtsLayout {
    root: PathBuf,
    device_type: String,
}

impl XtsLayout {
    pub fn new(xts_root: impl Into<PathBuf>, device_type: impl Into<String>) -> XtsLayout {
        XtsLayout {
            root: xts_root.into(),
            device_type: device_type.into(),
        }
    }

    fn type_root(&self) -> PathBuf {
        self.root.join(format!("android-{}", self.device_type))
    }

    pub fn testcases_dir(&self) -> PathBuf {
        self.type_root().join("testcases")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.type_root().join("results")
    }

    pub fn device_configurations_textproto(&self) -> PathBuf {
        self.type_root()
            .join("tools")
            .join("device_configurations.textproto")
    }

    pub fn module_config_path(&self, module: &str) -> PathBuf {
        self.testcases_dir().join(format!("{module}.config"))
    }

    /// Lists the module names available under `testcases/`, derived from every `*.config` file's
    /// stem.
    pub fn list_modules(&self) -> std::io::Result<Vec<String>> {
        let dir = self.testcases_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let pattern = dir.join("*.config");
        let mut modules: Vec<String> = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| std::io::Error::other(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .filter_map(|path| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .collect();
        modules.sort();
        Ok(modules)
    }

    /// Lists session result directories under `results/`, skipping the `latest` symlink/alias
    /// directory (spec §6).
    pub fn list_result_dirs(&self) -> std::io::Result<Vec<PathBuf>> {
        let dir = self.results_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if entry.file_name() == SKIPPED_RESULT_DIR {
                continue;
            }
            dirs.push(entry.path());
        }
        dirs.sort();
        Ok(dirs)
    }

    pub fn test_result_xml(session_dir: &Path) -> PathBuf {
        session_dir.join("test_result.xml")
    }
}

/// Sanitizes a job name for use as a directory-safe path component, mirroring the
/// `job_gen_<urlenc name>_<uuid>` layout of spec §4.5.
pub fn urlencode_job_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
