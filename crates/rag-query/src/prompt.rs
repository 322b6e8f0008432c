//! Final generation prompt rendering.

use rag_core::QueryPlan;

/// A fragment shown to the generator verbatim.
#[derive(Debug, Clone, Copy)]
pub struct Evidence<'a> {
    pub content: &'a str,
    pub score: Option<f64>,
}

impl<'a> Evidence<'a> {
    pub fn new(content: &'a str) -> Self {
        Self {
            content,
            score: None,
        }
    }

    pub fn scored(content: &'a str, score: f64) -> Self {
        Self {
            content,
            score: Some(score),
        }
    }
}

/// A compressed fragment shown as a one-line excerpt.
#[derive(Debug, Clone)]
pub struct BackgroundNote {
    pub excerpt: String,
    pub score: f64,
}

/// Deterministic prompt template shared by every answering path.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    /// Background notes listed individually before summarizing the rest.
    max_background_listed: usize,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(10)
    }
}

impl PromptComposer {
    pub fn new(max_background_listed: usize) -> Self {
        Self {
            max_background_listed,
        }
    }

    /// Render the generation prompt.
    ///
    /// The question analysis section appears only for a non-simple plan with
    /// sub-questions.
    pub fn compose(
        &self,
        question: &str,
        plan: Option<&QueryPlan>,
        evidence: &[Evidence<'_>],
    ) -> String {
        self.render(question, plan, evidence, None)
    }

    /// Render a two-tier prompt: evidence is labelled as the core section and
    /// the generator is told to prioritize it, even when `background` is empty.
    pub fn compose_tiered(
        &self,
        question: &str,
        evidence: &[Evidence<'_>],
        background: &[BackgroundNote],
    ) -> String {
        self.render(question, None, evidence, Some(background))
    }

    fn render(
        &self,
        question: &str,
        plan: Option<&QueryPlan>,
        evidence: &[Evidence<'_>],
        background: Option<&[BackgroundNote]>,
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str("# Task\n");
        prompt.push_str(
            "You are a retrieval-augmented assistant. Answer the user's question using the documents below.\n\n",
        );

        if let Some(plan) = plan.filter(|p| !p.is_simple && !p.sub_queries.is_empty()) {
            prompt.push_str("## Question analysis\n");
            prompt.push_str(&format!("Original question: {}\n", question));
            prompt.push_str(&format!("Question type: {}\n", plan.question_type));
            prompt.push_str("\nThe question was broken down into these sub-questions:\n");
            for (i, sub_query) in plan.sub_queries.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, sub_query));
            }
            prompt.push('\n');
        }

        let tiered = background.is_some();
        if tiered {
            prompt.push_str("## Core documents (full text)\n\n");
        } else {
            prompt.push_str("## Retrieved documents\n\n");
        }
        for (i, item) in evidence.iter().enumerate() {
            match item.score {
                Some(score) => {
                    prompt.push_str(&format!("### [Document {}] (relevance: {:.2})\n", i + 1, score))
                }
                None => prompt.push_str(&format!("### [Document {}]\n", i + 1)),
            }
            prompt.push_str(item.content);
            prompt.push_str("\n\n");
        }

        if let Some(background) = background.filter(|b| !b.is_empty()) {
            self.push_background(&mut prompt, background);
        }

        prompt.push_str("## Requirements\n");
        prompt.push_str(&format!("Answer the original question: {}\n\n", question));
        prompt.push_str(
            "1. Be comprehensive and accurate. If there are sub-questions, combine their answers.\n",
        );
        prompt.push_str(
            "2. If the documents do not contain enough information, say so explicitly instead of making anything up.\n",
        );
        prompt.push_str(
            "3. Write natural, flowing prose rather than mechanically listing the documents.\n",
        );
        if tiered {
            prompt.push_str(
                "4. Prioritize the core documents. Use the background documents only as supplementary context.\n",
            );
        }

        prompt
    }

    fn push_background(&self, prompt: &mut String, background: &[BackgroundNote]) {
        prompt.push_str(&format!(
            "## Background documents ({} compressed)\n",
            background.len()
        ));
        prompt.push_str(
            "These documents are related to the question but were compressed to save tokens. Refer to the core documents for details.\n",
        );

        let listed = background.len().min(self.max_background_listed);
        for (i, note) in background[..listed].iter().enumerate() {
            prompt.push_str(&format!(
                "- [Document {}] (relevance: {:.2}) {}\n",
                i + 1,
                note.score,
                note.excerpt
            ));
        }
        if background.len() > listed {
            prompt.push_str(&format!(
                "... and {} more related documents were compressed\n",
                background.len() - listed
            ));
        }
        prompt.push('\n');
    }
}
