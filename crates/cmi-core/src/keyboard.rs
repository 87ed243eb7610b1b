use serde::{Deserialize, Serialize};

/// Inline keyboard (buttons) attached to a rendered poll.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    /// Convenience for "one button per row" layouts.
    pub fn one_per_row(buttons: impl IntoIterator<Item = InlineButton>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_per_row_keeps_order() {
        let kb = InlineKeyboard::one_per_row(["a", "b"].into_iter().map(|l| InlineButton {
            label: l.to_string(),
            callback_data: l.to_string(),
        }));
        assert_eq!(kb.rows.len(), 2);
        assert_eq!(kb.rows[0][0].label, "a");
        assert_eq!(kb.rows[1][0].label, "b");
    }
}
