use history_sync_models::{BucketTimeZone, SyncMode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Largest page the remote history endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 30;

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
    #[serde(default)]
    pub categories: CategoryMapping,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Minimum gap between two consecutive requests, shared by every caller.
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Optional content-type filter (`archive`, `pgc`, `live`, `article`, ...). Empty means all.
    #[serde(default)]
    pub business: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl RemoteConfig {
    /// Page size bounded to what the remote API accepts.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: default_page_size(),
            min_request_interval_ms: default_min_request_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            business: None,
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncSettings {
    /// Retries per page after the first attempt fails with a transient error.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Time zone used to assign entries to day buckets (`local`, `utc` or `+08:00`).
    #[serde(default)]
    pub timezone: BucketTimeZone,
    #[serde(default = "default_bucket_cache_size")]
    pub bucket_cache_size: usize,
    #[serde(default = "default_stale_lock_minutes")]
    pub stale_lock_minutes: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            retry_budget: default_retry_budget(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            timezone: BucketTimeZone::default(),
            bucket_cache_size: default_bucket_cache_size(),
            stale_lock_minutes: default_stale_lock_minutes(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Cron expression with a leading seconds field.
    #[serde(default = "default_schedule")]
    pub schedule: String,
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
    #[serde(default)]
    pub startup_mode: SyncMode,
}

/// Static lookup from the feed's category signals to a human label.
///
/// Loaded once at startup and never mutated while a cycle runs.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CategoryMapping {
    /// Tag names shared by several main categories; they cannot be resolved from the tag alone.
    #[serde(default = "default_duplicated_tags")]
    pub duplicated_tags: Vec<String>,
    /// Sub-category tag name → main category.
    #[serde(default = "default_tag_to_main")]
    pub tag_to_main: HashMap<String, String>,
    /// Label for non-video business types (`pgc`, `live`, ...).
    #[serde(default = "default_business_labels")]
    pub business_labels: HashMap<String, String>,
    #[serde(default = "default_fallback_label")]
    pub fallback_label: String,
}

impl Default for CategoryMapping {
    fn default() -> Self {
        default_category_mapping()
    }
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.bilibili.com".to_string()
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_min_request_interval_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_retry_budget() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    2000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_bucket_cache_size() -> usize {
    64
}

fn default_stale_lock_minutes() -> u64 {
    120
}

fn default_schedule() -> String {
    "0 0 */6 * * *".to_string() // Every 6 hours
}

fn default_fallback_label() -> String {
    "待定".to_string()
}

fn default_duplicated_tags() -> Vec<String> {
    vec!["资讯".to_string(), "综合".to_string()]
}

fn default_business_labels() -> HashMap<String, String> {
    let mut labels = HashMap::new();
    labels.insert("pgc".to_string(), "番剧".to_string());
    labels.insert("live".to_string(), "直播".to_string());
    labels.insert("article".to_string(), "专栏".to_string());
    labels.insert("article-list".to_string(), "专栏".to_string());
    labels.insert("cheese".to_string(), "课堂".to_string());
    labels
}

const DEFAULT_TAG_GROUPS: &[(&str, &[&str])] = &[
    ("动画", &["动画", "MAD·AMV", "MMD·3D", "短片·手书", "配音", "手办·模玩", "特摄", "动漫杂谈"]),
    ("番剧", &["番剧", "官方延伸", "完结动画", "连载动画"]),
    ("国创", &["国创", "国产动画", "国产原创相关", "布袋戏", "动态漫·广播剧"]),
    ("音乐", &["音乐", "原创音乐", "翻唱", "VOCALOID·UTAU", "演奏", "MV", "音乐现场", "音乐综合", "乐评盘点", "音乐教学"]),
    ("舞蹈", &["舞蹈", "宅舞", "舞蹈综合", "舞蹈教程", "街舞", "明星舞蹈", "国风舞蹈", "手势·网红舞"]),
    ("游戏", &["游戏", "单机游戏", "电子竞技", "手机游戏", "网络游戏", "桌游棋牌", "GMV", "音游", "Mugen"]),
    ("知识", &["知识", "科学科普", "社科·法律·心理", "人文历史", "财经商业", "校园学习", "职业职场", "设计·创意", "野生技术协会"]),
    ("科技", &["科技", "数码", "软件应用", "计算机技术", "科工机械", "极客DIY"]),
    ("运动", &["运动", "篮球", "足球", "健身", "竞技体育", "运动文化", "运动综合"]),
    ("汽车", &["汽车", "汽车知识科普", "赛车", "改装玩车", "新能源车", "房车", "摩托车", "购车攻略", "汽车生活"]),
    ("生活", &["生活", "搞笑", "出行", "三农", "家居房产", "手工", "绘画", "日常", "亲子"]),
    ("美食", &["美食", "美食制作", "美食侦探", "美食测评", "田园美食", "美食记录"]),
    ("动物圈", &["动物圈", "喵星人", "汪星人", "动物二创", "野生动物", "小宠异宠", "动物综合"]),
    ("鬼畜", &["鬼畜", "鬼畜调教", "音MAD", "人力VOCALOID", "鬼畜剧场", "教程演示"]),
    ("时尚", &["时尚", "美妆护肤", "仿妆cos", "穿搭", "时尚潮流"]),
    ("资讯", &["热点", "环球", "社会", "multiple"]),
    ("娱乐", &["娱乐", "综艺", "娱乐杂谈", "粉丝创作", "明星综合"]),
    ("影视", &["影视", "影视杂谈", "影视剪辑", "小剧场", "预告·资讯"]),
    ("纪录片", &["纪录片", "人文·历史", "科学·探索·自然", "军事", "社会·美食·旅行"]),
    ("电影", &["电影", "华语电影", "欧美电影", "日本电影", "其他国家"]),
    ("电视剧", &["电视剧", "国产剧", "海外剧"]),
];

fn default_tag_to_main() -> HashMap<String, String> {
    let mut mapping = HashMap::new();
    for (main, tags) in DEFAULT_TAG_GROUPS {
        for tag in *tags {
            mapping.insert(tag.to_string(), main.to_string());
        }
    }
    mapping
}

pub fn default_category_mapping() -> CategoryMapping {
    CategoryMapping {
        duplicated_tags: default_duplicated_tags(),
        tag_to_main: default_tag_to_main(),
        business_labels: default_business_labels(),
        fallback_label: default_fallback_label(),
    }
}

pub fn default_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        schedule: default_schedule(),
        run_on_startup: default_true(),
        startup_mode: SyncMode::Incremental,
    }
}

impl Config {
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the config file, falling back to defaults when it does not exist yet.
    pub fn load_or_default(path: &PathBuf) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.remote.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("remote.base_url cannot be empty"));
        }
        if self.remote.page_size == 0 || self.remote.page_size > MAX_PAGE_SIZE {
            return Err(anyhow::anyhow!(
                "remote.page_size must be between 1 and {} (got {})",
                MAX_PAGE_SIZE,
                self.remote.page_size
            ));
        }
        if self.remote.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("remote.request_timeout_secs must be positive"));
        }
        if self.sync.backoff_base_ms > self.sync.backoff_max_ms {
            return Err(anyhow::anyhow!(
                "sync.backoff_base_ms ({}) cannot exceed sync.backoff_max_ms ({})",
                self.sync.backoff_base_ms,
                self.sync.backoff_max_ms
            ));
        }
        if self.sync.bucket_cache_size == 0 {
            return Err(anyhow::anyhow!("sync.bucket_cache_size must be at least 1"));
        }
        if let Some(scheduler) = &self.scheduler {
            if scheduler.schedule.trim().is_empty() {
                return Err(anyhow::anyhow!("scheduler.schedule cannot be empty"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_load_and_save() {
        let file = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.remote.page_size = 20;
        config.sync.retry_budget = 5;
        config.sync.timezone = BucketTimeZone::parse("+08:00").unwrap();
        config.scheduler = Some(default_scheduler_config());

        let path = file.path().to_path_buf();
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.remote.page_size, 20);
        assert_eq!(loaded.sync.retry_budget, 5);
        assert_eq!(loaded.sync.timezone, config.sync.timezone);
        assert_eq!(loaded.scheduler.unwrap().schedule, "0 0 */6 * * *");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [remote]
            page_size = 10

            [categories]
            fallback_label = "other"
            "#,
        )
        .unwrap();
        assert_eq!(config.remote.page_size, 10);
        assert_eq!(config.remote.min_request_interval_ms, 1000);
        assert_eq!(config.sync.retry_budget, 2);
        assert_eq!(config.sync.timezone, BucketTimeZone::Local);
        assert_eq!(config.categories.fallback_label, "other");
        assert_eq!(config.categories.tag_to_main.get("单机游戏").map(String::as_str), Some("游戏"));
    }

    #[test]
    fn test_config_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.remote.page_size = 50;
        assert!(config.validate().is_err());
        config.remote.page_size = 30;

        config.sync.backoff_base_ms = 120_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_page_size_is_bounded() {
        let mut remote = RemoteConfig::default();
        remote.page_size = 100;
        assert_eq!(remote.effective_page_size(), MAX_PAGE_SIZE);
        remote.page_size = 0;
        assert_eq!(remote.effective_page_size(), 1);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let config = Config::load_or_default(&path).unwrap();
        assert_eq!(config.remote.page_size, MAX_PAGE_SIZE);
    }
}
