//! 资源分类 - 按扩展名和路径关键字归类，用于生成统计报告

use crate::core::scanner::LocalFile;
use crate::storage::{normalize_remote_path, RemoteEntry};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// 分类输入
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub name: String,
    pub path: String,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

impl AssetRecord {
    /// `path` 为相对同步根目录的路径，统一为以 `/` 开头
    pub fn new(path: impl Into<String>, size_bytes: u64) -> Self {
        let path = normalize_remote_path(&path.into());
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        Self {
            name,
            path,
            size_bytes,
            modified_at: None,
        }
    }

    /// 本地文件，`relative` 为相对同步根目录的路径
    pub fn from_local(file: &LocalFile, relative: &str) -> Self {
        Self {
            modified_at: Some(file.modified_at),
            ..Self::new(relative, file.size)
        }
    }

    /// 远程条目，去掉远程根目录前缀后与本地记录使用同一套相对路径
    pub fn from_remote(entry: &RemoteEntry, remote_root: &str) -> Self {
        let root = normalize_remote_path(remote_root);
        let path = normalize_remote_path(&entry.path);
        let relative = if root == "/" {
            path.as_str()
        } else {
            path.strip_prefix(root.as_str())
                .filter(|rest| rest.starts_with('/'))
                .unwrap_or(path.as_str())
        };
        Self {
            modified_at: entry.modified_time,
            ..Self::new(relative, entry.size)
        }
    }
}

impl From<&RemoteEntry> for AssetRecord {
    fn from(entry: &RemoteEntry) -> Self {
        Self::from_remote(entry, "/")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Audio,
    Video,
    Data,
}

impl MediaType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "webp" | "gif" | "svg" | "bmp" => Some(Self::Image),
            "mp3" | "wav" | "ogg" | "flac" | "m4a" | "aac" => Some(Self::Audio),
            "mp4" | "mov" | "webm" | "mkv" | "avi" => Some(Self::Video),
            "json" | "csv" | "yaml" | "yml" | "toml" | "xml" | "txt" => Some(Self::Data),
            _ => None,
        }
    }

    pub fn of(record: &AssetRecord) -> Option<Self> {
        Path::new(&record.name)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Data => "data",
        }
    }

    fn other(self) -> Category {
        match self {
            Self::Image => Category::ImagesOther,
            Self::Audio => Category::AudioOther,
            Self::Video => Category::VideoOther,
            Self::Data => Category::DataOther,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    ImagesCharacters,
    ImagesCards,
    ImagesBackgrounds,
    ImagesUi,
    ImagesOther,
    AudioMusic,
    AudioSfx,
    AudioVoice,
    AudioOther,
    VideoCinematics,
    VideoOther,
    DataCards,
    DataOther,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImagesCharacters => "images.characters",
            Self::ImagesCards => "images.cards",
            Self::ImagesBackgrounds => "images.backgrounds",
            Self::ImagesUi => "images.ui",
            Self::ImagesOther => "images.other",
            Self::AudioMusic => "audio.music",
            Self::AudioSfx => "audio.sfx",
            Self::AudioVoice => "audio.voice",
            Self::AudioOther => "audio.other",
            Self::VideoCinematics => "video.cinematics",
            Self::VideoOther => "video.other",
            Self::DataCards => "data.cards",
            Self::DataOther => "data.other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Category {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// 按顺序匹配，先命中者生效
const RULES: &[(MediaType, &[&str], Category)] = &[
    (MediaType::Image, &["character", "portrait", "avatar", "hero"], Category::ImagesCharacters),
    (MediaType::Image, &["card"], Category::ImagesCards),
    (MediaType::Image, &["background", "/bg/", "scene"], Category::ImagesBackgrounds),
    (MediaType::Image, &["/ui/", "icon", "button"], Category::ImagesUi),
    (MediaType::Audio, &["music", "bgm", "/theme"], Category::AudioMusic),
    (MediaType::Audio, &["sfx", "effect"], Category::AudioSfx),
    (MediaType::Audio, &["voice", "/vo/", "dialog", "narration"], Category::AudioVoice),
    (MediaType::Video, &["cinematic", "cutscene", "intro", "trailer"], Category::VideoCinematics),
    (MediaType::Data, &["card"], Category::DataCards),
];

/// 分类；扩展名无法识别时返回 None（不计入报告）
pub fn classify(record: &AssetRecord) -> Option<Category> {
    let media = MediaType::of(record)?;
    let path = record.path.to_lowercase();
    let category = RULES
        .iter()
        .find(|(m, needles, _)| *m == media && needles.iter().any(|n| path.contains(n)))
        .map(|(_, _, c)| *c)
        .unwrap_or_else(|| media.other());
    Some(category)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub files: u64,
    pub bytes: u64,
}

impl Tally {
    fn add(&mut self, bytes: u64) {
        self.files += 1;
        self.bytes += bytes;
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MediaSummary {
    #[serde(flatten)]
    pub total: Tally,
    pub categories: BTreeMap<String, Tally>,
}

/// 分类统计报告
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationReport {
    pub generated_at: Option<DateTime<Utc>>,
    pub source: String,
    pub total: Tally,
    /// 扩展名无法识别而被排除的文件数
    pub excluded: u64,
    pub media: BTreeMap<String, MediaSummary>,
}

impl ClassificationReport {
    pub fn from_records<'a>(
        source: impl Into<String>,
        records: impl IntoIterator<Item = &'a AssetRecord>,
    ) -> Self {
        let mut report = Self {
            generated_at: Some(Utc::now()),
            source: source.into(),
            ..Self::default()
        };
        for record in records {
            report.add(record);
        }
        report
    }

    pub fn add(&mut self, record: &AssetRecord) -> Option<Category> {
        let Some(category) = classify(record) else {
            self.excluded += 1;
            return None;
        };
        let media = category.as_str().split('.').next().unwrap_or_default().to_string();
        let summary = self.media.entry(media).or_default();
        summary.total.add(record.size_bytes);
        summary
            .categories
            .entry(category.as_str().to_string())
            .or_default()
            .add(record.size_bytes);
        self.total.add(record.size_bytes);
        Some(category)
    }

    pub fn category(&self, category: Category) -> Tally {
        let media = category.as_str().split('.').next().unwrap_or_default();
        self.media
            .get(media)
            .and_then(|m| m.categories.get(category.as_str()))
            .copied()
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize report")
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        write_json(self, path)
    }
}

/// 以格式化 JSON 写入报告文件，自动创建父目录
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("failed to serialize report")?;
    std::fs::write(path, json).with_context(|| format!("failed to write report {}", path.display()))
}
