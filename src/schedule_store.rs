use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};
use crate::models::{JobDraft, PublishJob, Schedule};

impl Schedule {
    /// Assign consecutive days to `drafts`, starting the day after the latest
    /// existing date (or `today` when empty), and append them.
    pub fn append_drafts(
        &mut self,
        drafts: Vec<JobDraft>,
        today: NaiveDate,
        publish_time: NaiveTime,
    ) -> AppResult<Vec<PublishJob>> {
        let start_date = match self.videos.iter().map(|job| job.date).max() {
            Some(last_date) => next_day(last_date)?,
            None => today,
        };

        let mut appended = Vec::with_capacity(drafts.len());
        let mut date = start_date;
        for (i, draft) in drafts.into_iter().enumerate() {
            if i > 0 {
                date = next_day(date)?;
            }
            let job = PublishJob {
                video_file: draft.video_file,
                date,
                time: publish_time,
                title: draft.title,
                description: draft.description,
                keywords: draft.keywords,
                published: false,
            };
            self.videos.push(job.clone());
            appended.push(job);
        }

        Ok(appended)
    }

    /// Unpublished jobs eligible at `now`, in store order.
    pub fn due_at(&self, now: NaiveDateTime, catch_up_missed: bool) -> Vec<(usize, PublishJob)> {
        let today = now.date();
        let current_time = now.time();

        self.videos
            .iter()
            .enumerate()
            .filter(|(_, job)| !job.published)
            .filter(|(_, job)| {
                if job.date == today {
                    job.time <= current_time
                } else {
                    catch_up_missed && job.date < today
                }
            })
            .map(|(i, job)| (i, job.clone()))
            .collect()
    }

    pub fn mark_published(&mut self, index: usize) -> AppResult<()> {
        let job = self
            .videos
            .get_mut(index)
            .ok_or(AppError::JobNotFound { index })?;
        job.published = true;
        Ok(())
    }

    pub fn unpublished_count(&self) -> usize {
        self.videos.iter().filter(|job| !job.published).count()
    }
}

fn next_day(date: NaiveDate) -> AppResult<NaiveDate> {
    date.checked_add_days(Days::new(1))
        .ok_or_else(|| AppError::Internal(format!("Date overflow after {}", date)))
}

/// File-backed schedule. Every mutating call is a whole-document
/// load/mutate/save; a single writer process is assumed.
#[derive(Debug, Clone)]
pub struct ScheduleStore {
    path: PathBuf,
    publish_time: NaiveTime,
    catch_up_missed: bool,
}

impl ScheduleStore {
    pub fn new(path: impl Into<PathBuf>, publish_time: NaiveTime) -> Self {
        Self {
            path: path.into(),
            publish_time,
            catch_up_missed: false,
        }
    }

    pub fn with_catch_up(mut self, catch_up_missed: bool) -> Self {
        self.catch_up_missed = catch_up_missed;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> AppResult<Schedule> {
        if !self.path.exists() {
            log::debug!("No schedule at {}, starting empty", self.path.display());
            return Ok(Schedule::default());
        }

        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Schedule::default());
        }

        let schedule = serde_json::from_str(&raw).map_err(|e| {
            AppError::Internal(format!(
                "Schedule file {} is corrupt: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(schedule)
    }

    /// Write to a sibling temp file and rename it over the target.
    pub fn save(&self, schedule: &Schedule) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let serialized = serde_json::to_string_pretty(schedule)?;
        fs::write(&tmp_path, serialized)?;
        fs::rename(&tmp_path, &self.path)?;

        log::debug!(
            "Saved schedule with {} jobs to {}",
            schedule.videos.len(),
            self.path.display()
        );
        Ok(())
    }

    pub fn append(&self, drafts: Vec<JobDraft>, today: NaiveDate) -> AppResult<Vec<PublishJob>> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let mut schedule = self.load()?;
        let appended = schedule.append_drafts(drafts, today, self.publish_time)?;
        self.save(&schedule)?;

        if let (Some(first), Some(last)) = (appended.first(), appended.last()) {
            log::info!(
                "Scheduled {} videos from {} to {} at {}",
                appended.len(),
                first.date,
                last.date,
                self.publish_time.format("%H:%M")
            );
        }
        Ok(appended)
    }

    pub fn due_jobs(&self, now: NaiveDateTime) -> AppResult<Vec<(usize, PublishJob)>> {
        Ok(self.load()?.due_at(now, self.catch_up_missed))
    }

    /// Flips the flag and persists immediately.
    pub fn mark_published(&self, index: usize) -> AppResult<()> {
        let mut schedule = self.load()?;
        schedule.mark_published(index)?;
        self.save(&schedule)
    }

    pub fn unpublished_count(&self) -> AppResult<usize> {
        Ok(self.load()?.unpublished_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn six_pm() -> NaiveTime {
        NaiveTime::from_hms_opt(18, 0, 0).unwrap()
    }

    fn draft(name: &str) -> JobDraft {
        JobDraft {
            video_file: format!("videos/{}.mp4", name),
            title: format!("{} #Shorts", name),
            description: "desc".to_string(),
            keywords: "#a,#b".to_string(),
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> ScheduleStore {
        ScheduleStore::new(dir.path().join("schedule.json"), six_pm())
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let schedule = store_in(&dir).load().unwrap();
        assert!(schedule.videos.is_empty());
    }

    #[test]
    fn test_append_to_empty_starts_today() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let today = date(2024, 2, 27);

        let jobs = store
            .append(vec![draft("a"), draft("b"), draft("c")], today)
            .unwrap();

        let dates: Vec<_> = jobs.iter().map(|j| j.date).collect();
        assert_eq!(dates, vec![date(2024, 2, 27), date(2024, 2, 28), date(2024, 2, 29)]);
        assert!(jobs.iter().all(|j| j.time == six_pm() && !j.published));
        assert_eq!(store.load().unwrap().videos.len(), 3);
    }

    #[test]
    fn test_append_continues_after_latest_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.append(vec![draft("a"), draft("b")], date(2024, 12, 30)).unwrap();
        // A later batch ignores "today" and continues the sequence
        let jobs = store.append(vec![draft("c"), draft("d")], date(2024, 1, 1)).unwrap();

        assert_eq!(jobs[0].date, date(2025, 1, 1));
        assert_eq!(jobs[1].date, date(2025, 1, 2));

        let all = store.load().unwrap().videos;
        for pair in all.windows(2) {
            assert_eq!(pair[1].date, pair[0].date.succ_opt().unwrap());
        }
    }

    #[test]
    fn test_append_empty_batch_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.append(Vec::new(), date(2024, 1, 1)).unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_mark_published_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.append(vec![draft("a"), draft("b")], date(2024, 3, 1)).unwrap();

        store.mark_published(1).unwrap();
        let once = fs::read_to_string(store.path()).unwrap();
        store.mark_published(1).unwrap();
        let twice = fs::read_to_string(store.path()).unwrap();

        assert_eq!(once, twice);
        assert_eq!(store.unpublished_count().unwrap(), 1);
    }

    #[test]
    fn test_mark_published_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.append(vec![draft("a")], date(2024, 3, 1)).unwrap();

        assert!(matches!(
            store.mark_published(5),
            Err(AppError::JobNotFound { index: 5 })
        ));
    }

    #[test]
    fn test_due_jobs_filters_published_future_and_early() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let today = date(2024, 3, 1);
        store
            .append(vec![draft("today"), draft("tomorrow")], today)
            .unwrap();

        let before = today.and_hms_opt(17, 59, 0).unwrap();
        assert!(store.due_jobs(before).unwrap().is_empty());

        let after = today.and_hms_opt(18, 0, 0).unwrap();
        let due = store.due_jobs(after).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, 0);
        assert_eq!(due[0].1.video_file, "videos/today.mp4");

        store.mark_published(0).unwrap();
        assert!(store.due_jobs(after).unwrap().is_empty());
    }

    #[test]
    fn test_due_jobs_skips_missed_days_unless_catching_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.append(vec![draft("old")], date(2024, 3, 1)).unwrap();
        let later = date(2024, 3, 4).and_hms_opt(19, 0, 0).unwrap();

        assert!(store.due_jobs(later).unwrap().is_empty());
        let catching_up = store.clone().with_catch_up(true);
        assert_eq!(catching_up.due_jobs(later).unwrap().len(), 1);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.append(vec![draft("a")], date(2024, 3, 1)).unwrap();

        assert!(store.path().exists());
        assert!(!store.path().with_extension("json.tmp").exists());
    }
}
