//! 近期变更查询：在本地 git 仓库中查看模块目录最近的提交
//!
//! `git log -n <limit> --format=%H%x1f%an%x1f%cs <branch> -- <module_path>`，取最新一条作为证据。

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::process::Command;

use crate::capabilities::ChangeLookup;
use crate::config::ChangesSection;
use crate::core::{CapabilityError, ChangeEvidence};

const FIELD_SEP: char = '\u{1f}';
const SHORT_HASH_LEN: usize = 12;

pub struct GitChangeLookup {
    repo_root: PathBuf,
    branch: String,
    commit_limit: usize,
    module_paths: HashMap<String, String>,
}

impl GitChangeLookup {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            branch: "main".to_string(),
            commit_limit: 5,
            module_paths: HashMap::new(),
        }
    }

    pub fn from_config(cfg: &ChangesSection) -> Self {
        Self {
            repo_root: cfg.repo_root.clone(),
            branch: cfg.branch.clone(),
            commit_limit: cfg.commit_limit.max(1),
            module_paths: cfg.module_paths.clone(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// 模块名到仓库路径：先精确匹配，再按小写匹配，都没有则用模块名本身
    fn module_path(&self, module: &str) -> String {
        self.module_paths
            .get(module)
            .or_else(|| self.module_paths.get(&module.to_lowercase()))
            .cloned()
            .unwrap_or_else(|| module.to_string())
    }
}

/// 解析 git log 输出；空输出表示没有近期变更
pub fn parse_git_log(stdout: &str) -> Result<ChangeEvidence, CapabilityError> {
    let Some(line) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(ChangeEvidence::none());
    };

    let mut fields = line.split(FIELD_SEP).map(str::trim);
    let hash = fields
        .next()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| CapabilityError::Malformed(format!("missing commit hash: {line}")))?;
    let author = fields.next().filter(|a| !a.is_empty()).map(str::to_string);
    let commit_date = fields
        .next()
        .filter(|d| !d.is_empty())
        .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
        .transpose()
        .map_err(|e| CapabilityError::Malformed(format!("bad commit date in '{line}': {e}")))?;

    Ok(ChangeEvidence {
        found: true,
        commit_date,
        author,
        change_id: Some(hash.chars().take(SHORT_HASH_LEN).collect()),
    })
}

#[async_trait]
impl ChangeLookup for GitChangeLookup {
    async fn lookup_changes(&self, module: &str) -> Result<ChangeEvidence, CapabilityError> {
        let module = module.trim();
        if module.is_empty() {
            return Err(CapabilityError::Malformed("empty module name".to_string()));
        }
        let path = self.module_path(module);

        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo_root)
            .arg("log")
            .arg(format!("-n{}", self.commit_limit))
            .arg("--format=%H%x1f%an%x1f%cs")
            .arg(&self.branch)
            .arg("--")
            .arg(&path)
            .output()
            .await
            .map_err(|e| CapabilityError::Failed(format!("Failed to run git: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CapabilityError::Failed(format!(
                "Git command failed: {}",
                stderr.trim()
            )));
        }

        let evidence = parse_git_log(&String::from_utf8_lossy(&output.stdout))?;
        tracing::debug!(
            module = %module,
            path = %path,
            found = evidence.found,
            "git log inspected"
        );
        Ok(evidence)
    }
}
