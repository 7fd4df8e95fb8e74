//! 累计总数持久化 (按自然日)
//!
//! 启动时读取一次, 每个改变了总数的周期之后写入.
//! 存储日期与本地当天不同则在下一个周期前清零.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 持久化内容
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTotals {
    pub total: u64,
    /// 本地日期 `YYYY-MM-DD`
    pub date: String,
    pub started_at_ms: u64,
}

impl StoredTotals {
    pub fn new(total: u64, started_at_ms: u64) -> Self {
        Self {
            total,
            date: date_key(started_at_ms),
            started_at_ms,
        }
    }
}

/// 持久化端口
pub trait TotalStore {
    /// 没有记录时返回 `Ok(None)`
    fn load(&mut self) -> Result<Option<StoredTotals>>;

    fn save(&mut self, totals: &StoredTotals) -> Result<()>;
}

/// 当前本地日期
pub fn today_key() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// 毫秒时间戳对应的本地日期
pub fn date_key(timestamp_ms: u64) -> String {
    match Local.timestamp_millis_opt(timestamp_ms as i64).single() {
        Some(t) => t.format("%Y-%m-%d").to_string(),
        None => today_key(),
    }
}

/// 当前 Unix 毫秒时间戳
pub fn now_ms() -> u64 {
    Local::now().timestamp_millis().max(0) as u64
}

/// JSON 文件存储
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 默认位置: 本地数据目录/traffic-counter/totals.json
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("traffic-counter")
            .join("totals.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TotalStore for JsonFileStore {
    fn load(&mut self) -> Result<Option<StoredTotals>> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("读取 {} 失败", self.path.display()))
            }
        };
        match serde_json::from_str(&json) {
            Ok(totals) => Ok(Some(totals)),
            Err(e) => {
                warn!("⚠️ 计数文件解析失败: {}, 从 0 开始", e);
                Ok(None)
            }
        }
    }

    fn save(&mut self, totals: &StoredTotals) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("创建目录 {} 失败", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(totals)?;
        // 临时文件 + 改名
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("写入 {} 失败", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("替换 {} 失败", self.path.display()))?;
        debug!("💾 累计总数 {} 已保存", totals.total);
        Ok(())
    }
}

/// 内存存储 (测试与一次性运行), 克隆共享同一份数据
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Option<StoredTotals>>>,
    /// 写入次数
    saves: Arc<Mutex<u64>>,
}

impl MemoryStore {
    pub fn with(totals: StoredTotals) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(totals))),
            saves: Arc::default(),
        }
    }

    pub fn snapshot(&self) -> Option<StoredTotals> {
        self.inner.lock().ok().and_then(|g| g.clone())
    }

    pub fn save_count(&self) -> u64 {
        self.saves.lock().map(|g| *g).unwrap_or(0)
    }
}

impl TotalStore for MemoryStore {
    fn load(&mut self) -> Result<Option<StoredTotals>> {
        Ok(self.snapshot())
    }

    fn save(&mut self, totals: &StoredTotals) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("内存存储锁已损坏"))?;
        *guard = Some(totals.clone());
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip() {
        let dir = std::env::temp_dir().join(format!("tc-store-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let mut store = JsonFileStore::new(dir.join("nested").join("totals.json"));

        assert_eq!(store.load().unwrap(), None);

        let totals = StoredTotals {
            total: 42,
            date: "2026-10-18".into(),
            started_at_ms: 1000,
        };
        store.save(&totals).unwrap();
        assert_eq!(store.load().unwrap(), Some(totals));

        fs::write(store.path(), "garbage").unwrap();
        assert_eq!(store.load().unwrap(), None);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_memory_store_shares_state() {
        let store = MemoryStore::default();
        let mut writer = store.clone();
        writer.save(&StoredTotals::new(3, now_ms())).unwrap();
        assert_eq!(store.snapshot().map(|t| t.total), Some(3));
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn test_date_key_format() {
        let key = date_key(now_ms());
        assert_eq!(key, today_key());
        assert_eq!(key.len(), 10);
        assert_eq!(&key[4..5], "-");
    }
}
