use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;

/// One scheduled publication, persisted as an entry of `schedule.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishJob {
    pub video_file: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub title: String,
    pub description: String,
    /// Comma-joined tags
    pub keywords: String,
    pub published: bool,
}

impl PublishJob {
    pub fn keyword_list(&self) -> Vec<String> {
        self.keywords
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Caption used by the short-form platforms.
    pub fn caption(&self) -> String {
        format!("{}\n\n{}", self.title, self.description)
    }
}

/// Job metadata before the store assigns its date and time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDraft {
    pub video_file: String,
    pub title: String,
    pub description: String,
    pub keywords: String,
}

/// The whole persisted document: `{"videos": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub videos: Vec<PublishJob>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    YouTube,
    Instagram,
    TikTok,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::Instagram => "instagram",
            Platform::TikTok => "tiktok",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::YouTube => "YouTube",
            Platform::Instagram => "Instagram",
            Platform::TikTok => "TikTok",
        };
        f.write_str(name)
    }
}

impl FromStr for Platform {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "youtube" => Ok(Platform::YouTube),
            "instagram" => Ok(Platform::Instagram),
            "tiktok" => Ok(Platform::TikTok),
            other => Err(AppError::validation(
                "platforms",
                &format!("Unknown platform '{}'", other),
            )),
        }
    }
}

/// `HH:MM` serialization for the time-of-day field.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    /// Accepts `HH:MM` and, leniently, `HH:MM:SS`.
    pub fn parse(raw: &str) -> Result<NaiveTime, chrono::ParseError> {
        NaiveTime::parse_from_str(raw.trim(), FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> PublishJob {
        PublishJob {
            video_file: "videos/The_Last_Call_1712345678.mp4".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 4, 5).unwrap(),
            time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            title: "The Last Call 1712345678 #Shorts".to_string(),
            description: "A call that never ends\n\n#sms #story".to_string(),
            keywords: "#sms,#story".to_string(),
            published: false,
        }
    }

    #[test]
    fn test_job_serializes_with_persisted_field_layout() {
        let schedule = Schedule {
            videos: vec![sample_job()],
        };
        let json = serde_json::to_value(&schedule).unwrap();
        let entry = &json["videos"][0];

        assert_eq!(entry["video_file"], "videos/The_Last_Call_1712345678.mp4");
        assert_eq!(entry["date"], "2024-04-05");
        assert_eq!(entry["time"], "18:00");
        assert_eq!(entry["keywords"], "#sms,#story");
        assert_eq!(entry["published"], false);
    }

    #[test]
    fn test_job_reads_existing_documents() {
        let raw = r#"{"videos":[{"video_file":"videos/a.mp4","date":"2024-04-05","time":"18:00",
            "title":"a #Shorts","description":"d","keywords":"x, y,,z","published":true}]}"#;
        let schedule: Schedule = serde_json::from_str(raw).unwrap();
        let job = &schedule.videos[0];

        assert!(job.published);
        assert_eq!(job.time, NaiveTime::from_hms_opt(18, 0, 0).unwrap());
        assert_eq!(job.keyword_list(), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_caption_joins_title_and_description() {
        let job = sample_job();
        assert_eq!(
            job.caption(),
            "The Last Call 1712345678 #Shorts\n\nA call that never ends\n\n#sms #story"
        );
    }

    #[test]
    fn test_platform_parsing() {
        assert_eq!("YouTube".parse::<Platform>().unwrap(), Platform::YouTube);
        assert_eq!(" tiktok ".parse::<Platform>().unwrap(), Platform::TikTok);
        assert!("myspace".parse::<Platform>().is_err());
    }
}
