use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_PACING_DELAY: Duration = Duration::from_millis(200);

/// 設定檔中的 `pacing_mode`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingMode {
    #[default]
    FixedDelay,
    MinInterval,
}

/// 對上游 API 的節流策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingPolicy {
    /// 不等待（測試或無速率限制的 API）
    Disabled,
    /// 每處理完一個 primary entity 固定暫停
    FixedDelay(Duration),
    /// 兩次 pause 之間至少間隔此時間，已耗用的處理時間會扣除
    MinInterval(Duration),
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self::FixedDelay(DEFAULT_PACING_DELAY)
    }
}

impl PacingPolicy {
    /// delay 為 0 時停用
    pub fn new(mode: PacingMode, delay_ms: u64) -> Self {
        let delay = Duration::from_millis(delay_ms);
        match mode {
            _ if delay_ms == 0 => Self::Disabled,
            PacingMode::FixedDelay => Self::FixedDelay(delay),
            PacingMode::MinInterval => Self::MinInterval(delay),
        }
    }

    pub fn mode(&self) -> PacingMode {
        match self {
            Self::MinInterval(_) => PacingMode::MinInterval,
            Self::Disabled | Self::FixedDelay(_) => PacingMode::FixedDelay,
        }
    }

    pub fn delay_ms(&self) -> u64 {
        match self {
            Self::Disabled => 0,
            Self::FixedDelay(delay) | Self::MinInterval(delay) => {
                u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
            }
        }
    }

    /// 以 domain 的覆寫值（mode 或 delay 任一）取代預設策略的對應部分
    pub fn overridden(self, mode: Option<PacingMode>, delay_ms: Option<u64>) -> Self {
        if mode.is_none() && delay_ms.is_none() {
            return self;
        }
        Self::new(
            mode.unwrap_or_else(|| self.mode()),
            delay_ms.unwrap_or_else(|| self.delay_ms()),
        )
    }
}

pub struct Pacer {
    policy: PacingPolicy,
    last_release: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(policy: PacingPolicy) -> Self {
        Self {
            policy,
            last_release: Mutex::new(None),
        }
    }

    /// 在處理下一個 entity 前呼叫；執行流程會在此等待
    pub async fn pause(&self) {
        match self.policy {
            PacingPolicy::Disabled => {}
            PacingPolicy::FixedDelay(delay) => tokio::time::sleep(delay).await,
            PacingPolicy::MinInterval(interval) => {
                let mut last = self.last_release.lock().await;
                if let Some(previous) = *last {
                    tokio::time::sleep_until(previous + interval).await;
                }
                *last = Some(Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_mode_and_delay() {
        assert_eq!(PacingPolicy::new(PacingMode::FixedDelay, 0), PacingPolicy::Disabled);
        assert_eq!(PacingPolicy::new(PacingMode::MinInterval, 0), PacingPolicy::Disabled);
        assert_eq!(
            PacingPolicy::new(PacingMode::FixedDelay, 250),
            PacingPolicy::FixedDelay(Duration::from_millis(250))
        );
        assert_eq!(
            PacingPolicy::new(PacingMode::MinInterval, 250),
            PacingPolicy::MinInterval(Duration::from_millis(250))
        );
        assert_eq!(
            PacingPolicy::default(),
            PacingPolicy::FixedDelay(DEFAULT_PACING_DELAY)
        );
    }

    #[test]
    fn test_overridden() {
        let default = PacingPolicy::FixedDelay(Duration::from_millis(200));

        assert_eq!(default.overridden(None, None), default);
        assert_eq!(
            default.overridden(None, Some(500)),
            PacingPolicy::FixedDelay(Duration::from_millis(500))
        );
        assert_eq!(
            default.overridden(Some(PacingMode::MinInterval), None),
            PacingPolicy::MinInterval(Duration::from_millis(200))
        );
        assert_eq!(default.overridden(None, Some(0)), PacingPolicy::Disabled);
        assert_eq!(
            PacingPolicy::Disabled.overridden(None, Some(100)),
            PacingPolicy::FixedDelay(Duration::from_millis(100))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_waits() {
        let pacer = Pacer::new(PacingPolicy::FixedDelay(Duration::from_millis(200)));
        let start = Instant::now();
        pacer.pause().await;
        pacer.pause().await;
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_interval_only_waits_for_remainder() {
        let pacer = Pacer::new(PacingPolicy::MinInterval(Duration::from_millis(300)));
        let start = Instant::now();

        // 第一次不需等待
        pacer.pause().await;
        assert!(start.elapsed() < Duration::from_millis(300));

        tokio::time::sleep(Duration::from_millis(100)).await;
        pacer.pause().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_disabled_returns_immediately() {
        let pacer = Pacer::new(PacingPolicy::Disabled);
        let start = Instant::now();
        pacer.pause().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
