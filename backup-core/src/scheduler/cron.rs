//! Cron 驱动：按标签登记作业，轮询时找出到期作业并以单例模式触发
//!
//! 同一作业上一次执行尚未结束时，本次触发直接跳过，不排队也不补跑。

use chrono::{DateTime, Timelike, Utc};
use cron::Schedule;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::error::{BackupError, Result};

/// 作业执行体
pub type JobFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// 解析后的调度表
#[derive(Debug, Clone)]
pub enum CronSchedule {
    /// 日历表达式
    ///
    /// 标准 5 段表达式同时限定了日和星期时，任一字段匹配即触发，
    /// 此时拆成两张调度表分别计算后取较早者。
    Calendar {
        primary: Schedule,
        either_day: Option<Schedule>,
    },
    /// `@every <duration>`：从上一次计算时刻起按固定间隔触发
    Every(chrono::Duration),
}

impl CronSchedule {
    fn calendar(primary: Schedule) -> Self {
        CronSchedule::Calendar {
            primary,
            either_day: None,
        }
    }

    /// `base` 之后第一个满足 `accept` 的触发时间
    pub fn next_after(
        &self,
        base: &DateTime<Utc>,
        accept: impl Fn(&DateTime<Utc>) -> bool,
    ) -> Option<DateTime<Utc>> {
        match self {
            CronSchedule::Calendar {
                primary,
                either_day,
            } => {
                let primary = primary.after(base).find(|t| accept(t));
                let secondary = either_day
                    .as_ref()
                    .and_then(|schedule| schedule.after(base).find(|t| accept(t)));
                match (primary, secondary) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                }
            }
            CronSchedule::Every(interval) => {
                let base = base.with_nanosecond(0).unwrap_or(*base);
                let mut next = base.checked_add_signed(*interval)?;
                while !accept(&next) {
                    next = next.checked_add_signed(*interval)?;
                }
                Some(next)
            }
        }
    }
}

/// 解析 `@every` 的间隔，按秒截断，不足一秒按一秒计
fn parse_every(value: &str) -> std::result::Result<chrono::Duration, String> {
    let interval = humantime::parse_duration(value).map_err(|e| e.to_string())?;
    let seconds = i64::try_from(interval.as_secs())
        .map_err(|_| format!("interval '{value}' is too large"))?
        .max(1);
    chrono::Duration::try_seconds(seconds).ok_or_else(|| format!("interval '{value}' is too large"))
}

/// 解析 Cron 表达式
///
/// 支持标准 5 段格式（分 时 日 月 周，秒固定为 0），带秒的 6 段、带年的 7 段格式，
/// 以及 `@daily`、`@hourly`、`@midnight` 等描述符和 `@every 1h30m` 形式的固定间隔。
/// 5 段格式的星期字段按标准 cron 解释（0 和 7 = 周日，1 = 周一），
/// 6/7 段格式沿用 `cron` crate 的约定（1 = 周日）。
pub fn parse_schedule(expr: &str) -> Result<CronSchedule> {
    let invalid = |e: &dyn std::fmt::Display| BackupError::Cron(format!("'{expr}': {e}"));
    let fields: Vec<&str> = expr.split_whitespace().collect();

    if let [every, value] = fields.as_slice() {
        if every.eq_ignore_ascii_case("@every") {
            return parse_every(value)
                .map(CronSchedule::Every)
                .map_err(|e| invalid(&e));
        }
    }

    if fields.len() == 1 && fields[0].starts_with('@') {
        let descriptor = match fields[0].to_ascii_lowercase().as_str() {
            "@midnight" => "@daily".to_string(),
            other => other.to_string(),
        };
        let primary = Schedule::from_str(&descriptor).map_err(|e| invalid(&e))?;
        return Ok(CronSchedule::calendar(primary));
    }

    match fields.len() {
        5 => {
            let day_of_week = standard_day_of_week(fields[4]).map_err(|e| invalid(&e))?;
            let (minute, hour, day_of_month, month) = (fields[0], fields[1], fields[2], fields[3]);

            if is_unrestricted(day_of_month) || is_unrestricted(fields[4]) {
                let primary =
                    Schedule::from_str(&format!("0 {minute} {hour} {day_of_month} {month} {day_of_week}"))
                        .map_err(|e| invalid(&e))?;
                return Ok(CronSchedule::calendar(primary));
            }

            let by_day_of_month =
                Schedule::from_str(&format!("0 {minute} {hour} {day_of_month} {month} ?"))
                    .map_err(|e| invalid(&e))?;
            let by_day_of_week =
                Schedule::from_str(&format!("0 {minute} {hour} ? {month} {day_of_week}"))
                    .map_err(|e| invalid(&e))?;
            Ok(CronSchedule::Calendar {
                primary: by_day_of_month,
                either_day: Some(by_day_of_week),
            })
        }
        6 | 7 => {
            let primary = Schedule::from_str(&fields.join(" ")).map_err(|e| invalid(&e))?;
            Ok(CronSchedule::calendar(primary))
        }
        n => Err(invalid(&format!("expected 5, 6 or 7 fields, got {n}"))),
    }
}

/// 只有 `*`、`?`（或步长为 1 的写法）视为不限定，`*/2` 这类仍参与“任一匹配”规则
fn is_unrestricted(field: &str) -> bool {
    matches!(field, "*" | "?" | "*/1" | "?/1")
}

/// 把标准 cron 的数字星期（0-7）改写为星期名称列表，名称与通配符原样保留
fn standard_day_of_week(field: &str) -> std::result::Result<String, String> {
    let mut parts = Vec::new();
    for item in field.split(',') {
        parts.push(standard_day_of_week_item(item)?);
    }
    Ok(parts.join(","))
}

fn standard_day_of_week_item(item: &str) -> std::result::Result<String, String> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step
                .parse()
                .map_err(|_| format!("invalid day-of-week step '{item}'"))?;
            if step == 0 {
                return Err(format!("invalid day-of-week step '{item}'"));
            }
            (range, Some(step))
        }
        None => (item, None),
    };

    let bounds = match range {
        "*" | "?" => step.map(|_| (0, 6)),
        _ => match range.split_once('-') {
            Some((start, end)) => match (start.parse::<u32>(), end.parse::<u32>()) {
                (Ok(start), Ok(end)) => Some((start, end)),
                _ => None,
            },
            None => range.parse::<u32>().ok().map(|day| match step {
                Some(_) => (day, 6),
                None => (day, day),
            }),
        },
    };

    // 非数字写法（名称、`*`、`L` 等）交给 cron crate 处理
    let Some((start, end)) = bounds else {
        return Ok(item.to_string());
    };
    if start > 7 || end > 7 || start > end {
        return Err(format!("invalid day-of-week '{item}'"));
    }

    let mut days: Vec<usize> = (start..=end)
        .step_by(step.unwrap_or(1) as usize)
        .map(|day| (day % 7) as usize)
        .collect();
    days.sort_unstable();
    days.dedup();
    Ok(days
        .into_iter()
        .map(|day| WEEKDAYS[day])
        .collect::<Vec<_>>()
        .join(","))
}

#[derive(Debug, Default, Clone, Copy)]
struct JobTimes {
    next_run: Option<DateTime<Utc>>,
    last_run: Option<DateTime<Utc>>,
}

/// 已登记的 Cron 作业
pub struct CronJob {
    tag: String,
    schedule: CronSchedule,
    start_at: Option<DateTime<Utc>>,
    times: Mutex<JobTimes>,
    running: AtomicBool,
    func: JobFn,
}

impl std::fmt::Debug for CronJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronJob")
            .field("tag", &self.tag)
            .field("next_run", &self.next_run())
            .field("running", &self.is_running())
            .finish()
    }
}

impl CronJob {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.times().next_run
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.times().last_run
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn times(&self) -> JobTimes {
        match self.times.lock() {
            Ok(times) => *times,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn update_times(&self, f: impl FnOnce(&mut JobTimes)) {
        match self.times.lock() {
            Ok(mut times) => f(&mut times),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// 计算 `after` 之后（且不早于 start_at）的下一次触发时间
    fn upcoming(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        // 固定间隔作业的首次触发就是 start_at 本身
        if let (CronSchedule::Every(_), Some(start_at)) = (&self.schedule, self.start_at) {
            if start_at > after {
                return Some(start_at);
            }
        }

        let base = match self.start_at {
            Some(start_at) if start_at > after => start_at - chrono::Duration::seconds(1),
            _ => after,
        };
        self.schedule
            .next_after(&base, |t| *t > after && self.start_at.is_none_or(|s| *t >= s))
    }

    /// 在独立的 tokio 任务中执行作业，结束后释放单例标记
    fn fire(self: &Arc<Self>) {
        let job = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = RunningGuard(&job.running);
            (job.func)().await;
        });
    }
}

/// 作业结束（包括 panic）时清除运行标记
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 作业登记表，按标签唯一
#[derive(Default)]
pub struct CronDriver {
    jobs: HashMap<String, Arc<CronJob>>,
}

impl CronDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记作业，标签重复时报错
    pub fn register(
        &mut self,
        tag: &str,
        cron_expression: &str,
        start_at: Option<DateTime<Utc>>,
        func: JobFn,
        now: DateTime<Utc>,
    ) -> Result<Arc<CronJob>> {
        if self.jobs.contains_key(tag) {
            return Err(BackupError::custom(format!("作业 {tag} 已登记")));
        }

        let job = Arc::new(CronJob {
            tag: tag.to_string(),
            schedule: parse_schedule(cron_expression)?,
            start_at,
            times: Mutex::new(JobTimes::default()),
            running: AtomicBool::new(false),
            func,
        });
        let next_run = job.upcoming(now);
        job.update_times(|t| t.next_run = next_run);

        debug!(tag = %tag, next_run = ?next_run, "Cron作业已登记");
        self.jobs.insert(tag.to_string(), Arc::clone(&job));
        Ok(job)
    }

    pub fn get(&self, tag: &str) -> Option<Arc<CronJob>> {
        self.jobs.get(tag).cloned()
    }

    pub fn remove_by_tag(&mut self, tag: &str) -> Option<Arc<CronJob>> {
        self.jobs.remove(tag)
    }

    /// 仅当登记的仍是同一个作业实例时才移除
    pub fn remove_by_reference(&mut self, job: &Arc<CronJob>) -> bool {
        match self.jobs.get(job.tag()) {
            Some(current) if Arc::ptr_eq(current, job) => {
                self.jobs.remove(job.tag());
                true
            }
            _ => false,
        }
    }

    /// 重新放回先前移除的作业，标签已被占用时不做任何事
    pub fn reinstate(&mut self, job: Arc<CronJob>) -> bool {
        if self.jobs.contains_key(job.tag()) {
            return false;
        }
        self.jobs.insert(job.tag().to_string(), job);
        true
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// 找出到期作业，推进其下次触发时间，并返回需要执行的作业
    ///
    /// 仍在执行中的作业本轮跳过。错过的多次触发只执行一次，不补跑。
    pub fn due_jobs(&self, now: DateTime<Utc>) -> Vec<Arc<CronJob>> {
        let mut due = Vec::new();

        for job in self.jobs.values() {
            let Some(next_run) = job.next_run() else {
                continue;
            };
            if next_run > now {
                continue;
            }

            let upcoming = job.upcoming(now);
            if job
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                warn!(tag = %job.tag, "上一次执行尚未结束，跳过本次触发");
                job.update_times(|t| t.next_run = upcoming);
                continue;
            }

            job.update_times(|t| {
                t.last_run = Some(now);
                t.next_run = upcoming;
            });
            due.push(Arc::clone(job));
        }

        due
    }

    /// 触发所有到期作业
    pub fn run_pending(&self, now: DateTime<Utc>) -> usize {
        let due = self.due_jobs(now);
        for job in &due {
            job.fire();
        }
        due.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Weekday};
    use std::sync::atomic::AtomicUsize;

    fn noop() -> JobFn {
        Arc::new(|| Box::pin(async {}))
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_parse_schedule_formats() {
        assert!(parse_schedule("0 3 * * *").is_ok());
        assert!(parse_schedule("*/5 * * * * *").is_ok());
        assert!(parse_schedule("0 0 3 * * * 2030").is_ok());
        assert!(matches!(parse_schedule("* * *"), Err(BackupError::Cron(_))));
        assert!(matches!(parse_schedule("99 * * * *"), Err(BackupError::Cron(_))));
    }

    #[test]
    fn test_standard_day_of_week() {
        let cases = [
            ("*", "*"),
            ("1", "MON"),
            ("0", "SUN"),
            ("7", "SUN"),
            ("1-5", "MON,TUE,WED,THU,FRI"),
            ("5-7", "SUN,FRI,SAT"),
            ("*/2", "SUN,TUE,THU,SAT"),
            ("1,3", "MON,WED"),
            ("MON-FRI", "MON-FRI"),
            ("sat,0", "sat,SUN"),
        ];
        for (input, expected) in cases {
            assert_eq!(standard_day_of_week(input).unwrap(), expected, "input {input:?}");
        }
        assert!(standard_day_of_week("8").is_err());
        assert!(standard_day_of_week("5-2").is_err());
        assert!(standard_day_of_week("*/0").is_err());
    }

    #[test]
    fn test_five_field_weekdays_follow_standard_cron() {
        // 2024-05-01 是周三
        let wednesday_noon = at(12, 0, 0);
        let mut driver = CronDriver::new();

        let monday = driver
            .register("mon", "0 3 * * 1", None, noop(), wednesday_noon)
            .unwrap();
        let next = monday.next_run().unwrap();
        assert_eq!(next.weekday(), Weekday::Mon);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 6, 3, 0, 0).unwrap());

        let sunday = driver
            .register("sun", "0 3 * * 0", None, noop(), wednesday_noon)
            .unwrap();
        assert_eq!(sunday.next_run().unwrap().weekday(), Weekday::Sun);

        let workdays = driver
            .register("workdays", "0 3 * * 1-5", None, noop(), wednesday_noon)
            .unwrap();
        assert_eq!(
            workdays.next_run(),
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 3, 0, 0).unwrap())
        );

        assert!(matches!(parse_schedule("0 3 * * 8"), Err(BackupError::Cron(_))));
    }

    #[test]
    fn test_day_of_month_or_day_of_week() {
        // 1 号或任一周一，2024-05-01 周三中午之后最近的是 5 月 6 日周一
        let wednesday_noon = at(12, 0, 0);
        let mut driver = CronDriver::new();
        let job = driver
            .register("either", "0 3 1 * 1", None, noop(), wednesday_noon)
            .unwrap();
        assert_eq!(
            job.next_run(),
            Some(Utc.with_ymd_and_hms(2024, 5, 6, 3, 0, 0).unwrap())
        );

        // 从 5 月最后一个周一之后算起，下一次是 6 月 1 日（周六）
        let schedule = parse_schedule("0 3 1 * 1").unwrap();
        let after_last_monday = Utc.with_ymd_and_hms(2024, 5, 27, 4, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(&after_last_monday, |_| true),
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap())
        );

        // 星期字段为 `*` 时只看日
        let monthly = parse_schedule("0 3 1 * *").unwrap();
        assert_eq!(
            monthly.next_after(&wednesday_noon, |_| true),
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_descriptors() {
        let mut driver = CronDriver::new();
        let daily = driver
            .register("daily", "@daily", None, noop(), at(12, 0, 0))
            .unwrap();
        assert_eq!(
            daily.next_run(),
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap())
        );

        let hourly = driver
            .register("hourly", "@hourly", None, noop(), at(12, 30, 0))
            .unwrap();
        assert_eq!(hourly.next_run(), Some(at(13, 0, 0)));

        let midnight = parse_schedule("@midnight").unwrap();
        assert_eq!(
            midnight.next_after(&at(12, 0, 0), |_| true),
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap())
        );
        assert!(parse_schedule("@weekly").is_ok());
        assert!(matches!(parse_schedule("@sometimes"), Err(BackupError::Cron(_))));
    }

    #[test]
    fn test_stepped_day_field_is_restricted() {
        // 奇数日或周一：5 月 1 日中午之后最近的是 5 月 3 日（周五）
        let schedule = parse_schedule("0 3 */2 * 1").unwrap();
        assert_eq!(
            schedule.next_after(&at(12, 0, 0), |_| true),
            Some(Utc.with_ymd_and_hms(2024, 5, 3, 3, 0, 0).unwrap())
        );

        // 步长为 1 等同于 `*`，只看星期
        let mondays = parse_schedule("0 3 */1 * 1").unwrap();
        assert_eq!(
            mondays.next_after(&at(12, 0, 0), |_| true),
            Some(Utc.with_ymd_and_hms(2024, 5, 6, 3, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_every_interval() {
        let mut driver = CronDriver::new();
        let job = driver
            .register("every", "@every 1h", None, noop(), at(12, 0, 0))
            .unwrap();
        assert_eq!(job.next_run(), Some(at(13, 0, 0)));

        // 触发后从触发时刻重新计算
        let due = driver.due_jobs(at(13, 0, 5));
        assert_eq!(due.len(), 1);
        assert_eq!(job.next_run(), Some(at(14, 0, 5)));

        let delayed = driver
            .register("delayed", "@every 30m", Some(at(15, 0, 0)), noop(), at(12, 0, 0))
            .unwrap();
        assert_eq!(delayed.next_run(), Some(at(15, 0, 0)));

        let mixed = parse_schedule("@every 1h30m").unwrap();
        assert_eq!(
            mixed.next_after(&at(12, 0, 0), |_| true),
            Some(at(13, 30, 0))
        );

        assert!(matches!(parse_schedule("@every soon"), Err(BackupError::Cron(_))));
        assert!(matches!(parse_schedule("@every"), Err(BackupError::Cron(_))));
    }

    #[test]
    fn test_register_computes_next_run() {
        let mut driver = CronDriver::new();
        let job = driver
            .register("daily", "30 3 * * *", None, noop(), at(1, 0, 0))
            .unwrap();
        assert_eq!(job.next_run(), Some(at(3, 30, 0)));
        assert_eq!(job.last_run(), None);

        let err = driver.register("daily", "30 3 * * *", None, noop(), at(1, 0, 0));
        assert!(err.is_err());
        assert_eq!(driver.len(), 1);
    }

    #[test]
    fn test_start_at_delays_first_run() {
        let mut driver = CronDriver::new();
        let job = driver
            .register("hourly", "0 * * * *", Some(at(5, 0, 0)), noop(), at(1, 10, 0))
            .unwrap();
        assert_eq!(job.next_run(), Some(at(5, 0, 0)));
    }

    #[test]
    fn test_due_jobs_singleton_and_no_backfill() {
        let mut driver = CronDriver::new();
        let job = driver
            .register("minutely", "* * * * *", None, noop(), at(1, 0, 30))
            .unwrap();
        assert_eq!(job.next_run(), Some(at(1, 1, 0)));

        assert!(driver.due_jobs(at(1, 0, 59)).is_empty());

        // 错过了多个周期，只触发一次
        let due = driver.due_jobs(at(1, 5, 10));
        assert_eq!(due.len(), 1);
        assert!(job.is_running());
        assert_eq!(job.last_run(), Some(at(1, 5, 10)));
        assert_eq!(job.next_run(), Some(at(1, 6, 0)));

        // 仍在运行，跳过但推进下次时间
        assert!(driver.due_jobs(at(1, 6, 0)).is_empty());
        assert_eq!(job.next_run(), Some(at(1, 7, 0)));
        assert_eq!(job.last_run(), Some(at(1, 5, 10)));
    }

    #[test]
    fn test_remove_by_reference() {
        let mut driver = CronDriver::new();
        let old = driver.register("t", "* * * * *", None, noop(), at(1, 0, 0)).unwrap();
        driver.remove_by_tag("t");
        let new = driver.register("t", "* * * * *", None, noop(), at(1, 0, 0)).unwrap();

        assert!(!driver.remove_by_reference(&old));
        assert_eq!(driver.len(), 1);
        assert!(driver.remove_by_reference(&new));
        assert!(driver.is_empty());
    }

    #[tokio::test]
    async fn test_run_pending_fires_and_releases() {
        let counter = Arc::new(AtomicUsize::new(0));
        let func: JobFn = {
            let counter = Arc::clone(&counter);
            Arc::new(move || {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
        };

        let mut driver = CronDriver::new();
        let job = driver.register("fast", "* * * * * *", None, func, at(1, 0, 0)).unwrap();
        assert_eq!(driver.run_pending(at(1, 0, 1)), 1);

        for _ in 0..50 {
            if !job.is_running() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!job.is_running());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
