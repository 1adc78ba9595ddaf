use headless_chrome::{
    protocol::cdp::{Page, Target::CreateTarget},
    Browser, LaunchOptionsBuilder, Tab,
};
use std::{path::PathBuf, str::FromStr, sync::Arc, thread::sleep, time::Duration};

use super::{PageSession, SessionFactory};

const USER_AGENT_DEFAULT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

const DEFAULT_TAB_TIMEOUT: Duration = Duration::from_secs(15);

fn stealth_tab(tab: &Arc<Tab>) -> anyhow::Result<()> {
    tab.call_method(Page::AddScriptToEvaluateOnNewDocument {
        source: "Object.defineProperty(navigator, 'webdriver', {get: () => undefined});"
            .to_string(),
        world_name: None,
        include_command_line_api: None,
        run_immediately: None,
    })?;
    tab.set_user_agent(USER_AGENT_DEFAULT, Some("en-US,en"), Some("Mac OS X"))?;

    Ok(())
}

/// Opens one Chromium process per session. `CHROME_PATH` overrides the
/// binary; defaults to `chromium` on PATH.
pub struct ChromeFactory {
    tab_timeout: Duration,
}

impl ChromeFactory {
    pub fn new() -> Self {
        Self {
            tab_timeout: DEFAULT_TAB_TIMEOUT,
        }
    }
}

impl Default for ChromeFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionFactory for ChromeFactory {
    type Session = ChromeSession;

    fn open(&self) -> anyhow::Result<ChromeSession> {
        let browser = Browser::new(
            LaunchOptionsBuilder::default()
                .sandbox(false)
                .path(Some(
                    PathBuf::from_str(
                        &std::env::var("CHROME_PATH").unwrap_or("chromium".to_string()),
                    )
                    .expect("infallible PathBuf::from_str for &str"),
                ))
                .build()
                .map_err(|err| anyhow::anyhow!("chrome launch options: {err}"))?,
        )?;

        let tab = browser.new_tab_with_options(CreateTarget {
            url: "about:blank".to_string(),
            width: Some(1366),
            height: Some(768),
            left: None,
            top: None,
            window_state: None,
            browser_context_id: None,
            enable_begin_frame_control: None,
            new_window: None,
            background: None,
            for_tab: None,
            hidden: None,
        })?;

        stealth_tab(&tab)?;

        tab.set_default_timeout(self.tab_timeout);

        Ok(ChromeSession {
            _browser: browser,
            tab,
        })
    }
}

/// A live tab in a dedicated browser process. The process is killed when
/// the session drops, so callers can't leak it.
pub struct ChromeSession {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl PageSession for ChromeSession {
    fn navigate(&mut self, url: &str) -> anyhow::Result<()> {
        self.tab.navigate_to(url)?;
        self.tab.wait_until_navigated()?;
        Ok(())
    }

    fn content(&mut self) -> anyhow::Result<String> {
        Ok(self.tab.get_content()?)
    }

    fn scroll_to_end(&mut self) {
        if let Err(err) = self
            .tab
            .evaluate("window.scrollTo(0, document.body.scrollHeight);", false)
        {
            log::debug!("scroll failed: {err}");
        }
    }

    fn dismiss_overlay(&mut self, selectors: &[String]) -> bool {
        for selector in selectors {
            // find_element doesn't wait; absent overlays cost nothing
            if let Ok(element) = self.tab.find_element(selector) {
                match element.click() {
                    Ok(_) => {
                        log::debug!("dismissed overlay via '{selector}'");
                        return true;
                    }
                    Err(err) => log::debug!("overlay close '{selector}' not clickable: {err}"),
                }
            }
        }

        false
    }

    fn settle(&mut self, delay: Duration) {
        sleep(delay);
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        let _ = self.tab.close(true);
    }
}
