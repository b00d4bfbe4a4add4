//! Cross-window live updates between UI surfaces and pop-out editors.
//!
//! The channel is independent of the coordinator. A pop-out editor publishes saved mocks,
//! which the primary surface of the same tab applies. Surfaces publish theme changes,
//! which open pop-outs follow.

use std::fmt;
use std::sync::{Arc, Mutex};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::broadcast::{Broadcast, SubscriptionId};
use crate::domain::{MockDefinition, TabId, Theme};
use crate::Error;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LiveUpdate {
    #[serde(rename_all = "camelCase")]
    MockSaved { tab_id: TabId, mock: MockDefinition },
    ThemeChanged { theme: Theme },
}

pub type LiveChannel = Broadcast<LiveUpdate>;

/// Secondary editor for one mock, detached from the primary surface.
pub struct PopoutEditor {
    tab_id: TabId,
    original: MockDefinition,
    theme: Arc<Mutex<Theme>>,
    channel: Arc<LiveChannel>,
    subscription: SubscriptionId,
}

impl PopoutEditor {
    pub fn open(channel: Arc<LiveChannel>, tab_id: TabId, mock: MockDefinition, theme: Theme) -> PopoutEditor {
        let theme = Arc::new(Mutex::new(theme));

        let follower = Arc::clone(&theme);
        let subscription = channel.subscribe(move |update| {
            if let LiveUpdate::ThemeChanged { theme } = update {
                *follower.lock().unwrap_or_else(|e| e.into_inner()) = *theme;
            }
        });

        PopoutEditor {
            tab_id,
            original: mock,
            theme,
            channel,
            subscription,
        }
    }

    pub fn operation_name(&self) -> &str {
        &self.original.operation_name
    }

    pub fn theme(&self) -> Theme {
        *self.theme.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The mock body as pretty-printed JSON, empty for a new mock.
    pub fn text(&self) -> String {
        self.original
            .custom_response
            .as_ref()
            .and_then(|body| serde_json::to_string_pretty(body).ok())
            .unwrap_or_default()
    }

    /// Validates `text` and publishes it as the new body, keeping activation and delay.
    ///
    /// Invalid text is rejected here and nothing is published.
    pub fn save(&self, text: &str) -> Result<MockDefinition, Error> {
        let mut mock = MockDefinition::parse(self.original.operation_name.clone(), text)?;
        mock.activated = self.original.activated;
        mock.delay = self.original.delay;

        let delivered = self.channel.publish(&LiveUpdate::MockSaved {
            tab_id: self.tab_id,
            mock: mock.clone(),
        });
        debug!("pop-out saved {} for tab {} ({delivered} listeners)", mock.operation_name, self.tab_id);

        Ok(mock)
    }
}

impl Drop for PopoutEditor {
    fn drop(&mut self) {
        self.channel.unsubscribe(self.subscription);
    }
}

impl fmt::Debug for PopoutEditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopoutEditor")
            .field("tab_id", &self.tab_id)
            .field("operation_name", &self.original.operation_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_save_publishes_validated_mock() {
        let channel = Arc::new(LiveChannel::new());
        let saved = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&saved);
        channel.subscribe(move |update| sink.lock().unwrap().push(update.clone()));

        let original = MockDefinition::new("GetUser", json!({"data": 1})).activated(false).delay(250);
        let editor = PopoutEditor::open(Arc::clone(&channel), 3, original, Theme::Light);
        assert_eq!(editor.text(), "{\n  \"data\": 1\n}");

        assert!(matches!(editor.save("{ nope"), Err(Error::InvalidMockBody(_))));
        assert!(saved.lock().unwrap().is_empty());

        let mock = editor.save(r#"{"data": 2}"#).unwrap();
        assert_eq!(mock.delay, Some(250));
        assert!(!mock.activated);
        assert_eq!(*saved.lock().unwrap(), vec![LiveUpdate::MockSaved { tab_id: 3, mock }]);
    }

    #[test]
    fn test_follows_theme_until_closed() {
        let channel = Arc::new(LiveChannel::new());
        let editor = PopoutEditor::open(Arc::clone(&channel), 1, MockDefinition::removal("A"), Theme::Light);
        assert_eq!(editor.text(), "");

        channel.publish(&LiveUpdate::ThemeChanged { theme: Theme::Dark });
        assert_eq!(editor.theme(), Theme::Dark);

        drop(editor);
        assert_eq!(channel.listener_count(), 0);
    }

    #[test]
    fn test_live_update_wire_format() {
        let update = LiveUpdate::ThemeChanged { theme: Theme::Dark };
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({"type": "themeChanged", "theme": "dark"}));
    }
}
