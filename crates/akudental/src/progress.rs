use indicatif::{ProgressBar, ProgressStyle};

/// Builds progress bars with a shared look. A quiet builder yields
/// a hidden bar, so callers never need to branch on `--quiet`.
pub(crate) struct ProgressBarBuilder {
    template: &'static str,
    quiet: bool,
    len: Option<u64>,
}

impl ProgressBarBuilder {
    pub(crate) fn new(template: &'static str, quiet: bool) -> Self {
        Self {
            template,
            quiet,
            len: None,
        }
    }

    pub(crate) fn len(mut self, len: u64) -> Self {
        self.len = Some(len);
        self
    }

    pub(crate) fn build(self) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }

        let pbar = match self.len {
            Some(len) => ProgressBar::new(len),
            None => ProgressBar::new_spinner(),
        };

        let style = ProgressStyle::with_template(self.template)
            .unwrap_or_else(|_| ProgressStyle::default_bar());

        pbar.with_style(style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_progress_bar_is_hidden() {
        let pbar = ProgressBarBuilder::new("{pos}", true).len(10).build();
        assert!(pbar.is_hidden());
    }

    #[test]
    fn progress_bar_len() {
        let pbar = ProgressBarBuilder::new("{pos}/{len}", false)
            .len(10)
            .build();
        assert_eq!(pbar.length(), Some(10));
    }
}
