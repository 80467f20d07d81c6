use reedline::{Prompt, PromptEditMode, PromptHistorySearch, PromptHistorySearchStatus};
use std::borrow::Cow;

pub const DEFAULT_PROMPT: &str = "dbline> ";

const MAX_URL_WIDTH: usize = 45;

/// `<index>: <url>> `, with the URL cut before any `;` or `?` parameters
/// and shortened to 45 characters.
pub fn connection_prompt(index: usize, url: &str) -> String {
    let url = url.split([';', '?']).next().unwrap_or_default();
    let url: String = url.chars().take(MAX_URL_WIDTH).collect();
    format!("{index}: {url}> ")
}

pub struct ShellPrompt {
    text: String,
}

impl ShellPrompt {
    pub fn new(text: String) -> Self {
        Self { text }
    }

    pub fn update(&mut self, text: String) {
        self.text = text;
    }
}

impl Default for ShellPrompt {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT.to_string())
    }
}

impl Prompt for ShellPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.text)
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, edit_mode: PromptEditMode) -> Cow<'_, str> {
        match edit_mode {
            PromptEditMode::Vi(reedline::PromptViMode::Insert) => Cow::Borrowed("[INS] "),
            PromptEditMode::Vi(reedline::PromptViMode::Normal) => Cow::Borrowed("[NOR] "),
            _ => Cow::Borrowed(""),
        }
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        match history_search.term.as_str() {
            "" => Cow::Owned(format!("({prefix}reverse-i-search): ")),
            term => Cow::Owned(format!("({prefix}reverse-i-search '{term}'): ")),
        }
    }
}
