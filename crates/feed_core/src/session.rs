//! Idle timeout for the home screen: after the timeout the app returns to
//! Home and then exits.

use std::{sync::Arc, time::Duration};

use shared::protocol::{NavigationRequest, Screen};
use tokio::task::JoinHandle;
use tracing::info;

use crate::{collaborators::Navigator, config::FeedSettings};

/// Timer handle scoped to a screen. Dropping it cancels the timer.
pub struct SessionTimeout {
    task: JoinHandle<()>,
}

impl SessionTimeout {
    pub fn arm(navigator: Arc<dyn Navigator>, timeout: Duration, exit_delay: Duration) -> Self {
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            info!(?timeout, "session timed out");
            navigator.navigate(NavigationRequest::Reset {
                screen: Screen::Home,
            });
            tokio::time::sleep(exit_delay).await;
            navigator.navigate(NavigationRequest::ExitApp);
        });
        Self { task }
    }

    pub fn from_settings(navigator: Arc<dyn Navigator>, settings: &FeedSettings) -> Self {
        Self::arm(navigator, settings.session_timeout(), settings.exit_delay())
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for SessionTimeout {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Arms the timeout while the screen has focus and cancels it when focus is lost.
pub struct FocusedSession {
    navigator: Arc<dyn Navigator>,
    timeout: Duration,
    exit_delay: Duration,
    timer: Option<SessionTimeout>,
}

impl FocusedSession {
    pub fn new(navigator: Arc<dyn Navigator>, settings: &FeedSettings) -> Self {
        Self {
            navigator,
            timeout: settings.session_timeout(),
            exit_delay: settings.exit_delay(),
            timer: None,
        }
    }

    pub fn set_focused(&mut self, focused: bool) {
        if !focused {
            self.timer = None;
            return;
        }
        if !self.is_armed() {
            self.timer = Some(SessionTimeout::arm(
                Arc::clone(&self.navigator),
                self.timeout,
                self.exit_delay,
            ));
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingNavigator {
        requests: Mutex<Vec<NavigationRequest>>,
    }

    impl RecordingNavigator {
        fn requests(&self) -> Vec<NavigationRequest> {
            self.requests.lock().expect("lock").clone()
        }
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, request: NavigationRequest) {
            self.requests.lock().expect("lock").push(request);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_resets_to_home_then_exits() {
        let navigator = Arc::new(RecordingNavigator::default());
        let timer = SessionTimeout::arm(
            navigator.clone(),
            Duration::from_secs(7200),
            Duration::from_secs(1),
        );

        tokio::time::sleep(Duration::from_secs(7199)).await;
        assert!(navigator.requests().is_empty());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(
            navigator.requests(),
            vec![NavigationRequest::Reset {
                screen: Screen::Home
            }]
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(navigator.requests().len(), 2);
        assert_eq!(navigator.requests()[1], NavigationRequest::ExitApp);
        assert!(timer.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_cancels_the_timer() {
        let navigator = Arc::new(RecordingNavigator::default());
        let timer = SessionTimeout::arm(
            navigator.clone(),
            Duration::from_secs(10),
            Duration::from_secs(1),
        );
        tokio::time::sleep(Duration::from_secs(5)).await;
        timer.cancel();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(navigator.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn losing_focus_disarms_and_regaining_rearms() {
        let navigator = Arc::new(RecordingNavigator::default());
        let settings = FeedSettings {
            session_timeout_secs: 10,
            ..FeedSettings::default()
        };
        let mut session = FocusedSession::new(navigator.clone(), &settings);

        session.set_focused(true);
        assert!(session.is_armed());
        tokio::time::sleep(Duration::from_secs(8)).await;
        session.set_focused(false);
        assert!(!session.is_armed());

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert!(navigator.requests().is_empty());

        session.set_focused(true);
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(
            navigator.requests(),
            vec![NavigationRequest::Reset {
                screen: Screen::Home
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn refocusing_after_expiry_arms_a_fresh_timer() {
        let navigator = Arc::new(RecordingNavigator::default());
        let settings = FeedSettings {
            session_timeout_secs: 10,
            exit_delay_ms: 1000,
            ..FeedSettings::default()
        };
        let mut session = FocusedSession::new(navigator.clone(), &settings);

        session.set_focused(true);
        tokio::time::sleep(Duration::from_millis(11_500)).await;
        assert_eq!(navigator.requests().len(), 2);
        assert!(!session.is_armed());

        session.set_focused(true);
        assert!(session.is_armed());
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(navigator.requests().len(), 3);
        assert_eq!(
            navigator.requests()[2],
            NavigationRequest::Reset {
                screen: Screen::Home
            }
        );
    }
}
