//! Multi-round retrieval over a query plan.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use rag_core::{
    guarded, AgenticConfig, CancelToken, Embedder, ExecutionResult, Fragment, QueryPlan,
    QueryRequest, Result, Retriever, SearchFilters, TimeoutConfig,
};

/// Runs one retrieval round per planned sub-question.
///
/// A round that fails (embedding, search, timeout or cancellation) is
/// logged and skipped. It adds no fragments and is not counted.
pub struct QueryExecutor {
    embedder: Arc<dyn Embedder>,
    retriever: Arc<dyn Retriever>,
    config: AgenticConfig,
    timeouts: TimeoutConfig,
}

impl QueryExecutor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        retriever: Arc<dyn Retriever>,
        config: AgenticConfig,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            embedder,
            retriever,
            config,
            timeouts,
        }
    }

    /// Per-round result width for a requested overall top-K.
    pub fn round_width(&self, top_k: Option<usize>) -> usize {
        match top_k.filter(|k| *k > 0) {
            Some(k) => (k / 2).max(self.config.min_round_width),
            None => self.config.default_round_width,
        }
    }

    /// Execute every round of `plan`.
    pub async fn execute(
        &self,
        plan: &QueryPlan,
        request: &QueryRequest,
        cancel: &CancelToken,
    ) -> ExecutionResult {
        let width = self.round_width(request.requested_top_k());
        let filters = request.filters();

        let rounds = if self.config.parallel_rounds {
            self.execute_parallel(plan, &filters, width, cancel).await
        } else {
            self.execute_sequential(plan, &filters, width, cancel).await
        };

        let mut result = ExecutionResult::default();
        for fragments in rounds.into_iter().flatten() {
            result.all_fragments.extend(fragments);
            result.rounds += 1;
        }

        debug!(
            "Executed {}/{} rounds, {} fragments",
            result.rounds,
            plan.sub_queries.len(),
            result.all_fragments.len()
        );
        result
    }

    async fn execute_sequential(
        &self,
        plan: &QueryPlan,
        filters: &SearchFilters,
        width: usize,
        cancel: &CancelToken,
    ) -> Vec<Option<Vec<Fragment>>> {
        let mut rounds = Vec::with_capacity(plan.sub_queries.len());

        for (i, sub_query) in plan.sub_queries.iter().enumerate() {
            let outcome = retrieve_round(
                self.embedder.as_ref(),
                self.retriever.as_ref(),
                self.timeouts,
                cancel,
                sub_query,
                filters,
                width,
            )
            .await;
            rounds.push(settle(i, sub_query, outcome));
        }

        rounds
    }

    async fn execute_parallel(
        &self,
        plan: &QueryPlan,
        filters: &SearchFilters,
        width: usize,
        cancel: &CancelToken,
    ) -> Vec<Option<Vec<Fragment>>> {
        let mut tasks = JoinSet::new();

        for (i, sub_query) in plan.sub_queries.iter().enumerate() {
            let embedder = Arc::clone(&self.embedder);
            let retriever = Arc::clone(&self.retriever);
            let timeouts = self.timeouts;
            let cancel = cancel.clone();
            let filters = filters.clone();
            let sub_query = sub_query.clone();

            tasks.spawn(async move {
                let outcome = retrieve_round(
                    embedder.as_ref(),
                    retriever.as_ref(),
                    timeouts,
                    &cancel,
                    &sub_query,
                    &filters,
                    width,
                )
                .await;
                (i, settle(i, &sub_query, outcome))
            });
        }

        // Slots keep plan order regardless of completion order.
        let mut rounds = vec![None; plan.sub_queries.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, fragments)) => rounds[i] = fragments,
                Err(e) => warn!("Retrieval round task aborted: {}", e),
            }
        }
        rounds
    }
}

async fn retrieve_round(
    embedder: &dyn Embedder,
    retriever: &dyn Retriever,
    timeouts: TimeoutConfig,
    cancel: &CancelToken,
    sub_query: &str,
    filters: &SearchFilters,
    width: usize,
) -> Result<Vec<Fragment>> {
    let vector = guarded(
        cancel,
        timeouts.embed(),
        "embed",
        embedder.embed_query(sub_query),
    )
    .await?;

    guarded(
        cancel,
        timeouts.search(),
        "search",
        retriever.search(&vector, filters, width),
    )
    .await
}

fn settle(index: usize, sub_query: &str, outcome: Result<Vec<Fragment>>) -> Option<Vec<Fragment>> {
    match outcome {
        Ok(fragments) => {
            debug!(
                "Round {} ({:?}) retrieved {} fragments",
                index + 1,
                sub_query,
                fragments.len()
            );
            Some(fragments)
        }
        Err(e) => {
            warn!("Round {} ({:?}) skipped: {}", index + 1, sub_query, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fragments, KeyedRetriever, LengthEmbedder};
    use rag_core::QuestionType;
    use std::collections::BTreeSet;

    fn plan(sub_queries: &[&str]) -> QueryPlan {
        QueryPlan {
            is_simple: false,
            question_type: QuestionType::MultiAspect,
            sub_queries: sub_queries.iter().map(|s| s.to_string()).collect(),
            keywords: BTreeSet::new(),
            reasoning: String::new(),
            degraded: false,
        }
    }

    fn executor(retriever: Arc<KeyedRetriever>, parallel: bool) -> QueryExecutor {
        let config = AgenticConfig {
            parallel_rounds: parallel,
            ..Default::default()
        };
        QueryExecutor::new(
            Arc::new(LengthEmbedder),
            retriever,
            config,
            TimeoutConfig::default(),
        )
    }

    fn ids(fragments: &[Fragment]) -> Vec<i64> {
        fragments.iter().map(|f| f.id).collect()
    }

    #[test]
    fn test_round_width() {
        let executor = executor(Arc::new(KeyedRetriever::default()), false);
        assert_eq!(executor.round_width(None), 3);
        assert_eq!(executor.round_width(Some(0)), 3);
        assert_eq!(executor.round_width(Some(4)), 3);
        assert_eq!(executor.round_width(Some(10)), 5);
        assert_eq!(executor.round_width(Some(7)), 3);
    }

    #[tokio::test]
    async fn test_all_rounds_succeed() {
        let retriever = Arc::new(KeyedRetriever::keyed(vec![
            ("first?", fragments(&[1, 2])),
            ("second?!", fragments(&[2, 3])),
        ]));
        let executor = executor(retriever.clone(), false);

        let result = executor
            .execute(
                &plan(&["first?", "second?!"]),
                &QueryRequest::new("q"),
                &CancelToken::new(),
            )
            .await;

        assert_eq!(result.rounds, 2);
        assert_eq!(ids(&result.all_fragments), vec![1, 2, 2, 3]);
        assert_eq!(*retriever.limits.lock().unwrap(), vec![3, 3]);
    }

    #[tokio::test]
    async fn test_failed_rounds_are_skipped() {
        // "unknown" has no keyed entry, so its search fails.
        let retriever = Arc::new(KeyedRetriever::keyed(vec![
            ("a", fragments(&[1])),
            ("ccc", fragments(&[3])),
        ]));
        let executor = executor(retriever.clone(), false);

        let result = executor
            .execute(
                &plan(&["a", "embed-fail", "ccc", "unknown"]),
                &QueryRequest::new("q"),
                &CancelToken::new(),
            )
            .await;

        assert_eq!(result.rounds, 2);
        assert_eq!(ids(&result.all_fragments), vec![1, 3]);
        // The embed failure never reaches the retriever.
        assert_eq!(retriever.calls(), 3);
    }

    #[tokio::test]
    async fn test_parallel_rounds_keep_plan_order() {
        let retriever = Arc::new(KeyedRetriever::keyed(vec![
            ("a", fragments(&[1])),
            ("bb", fragments(&[2])),
            ("ccc", fragments(&[3])),
        ]));
        let executor = executor(retriever, true);

        let result = executor
            .execute(
                &plan(&["ccc", "missing-key", "a", "bb"]),
                &QueryRequest::new("q"),
                &CancelToken::new(),
            )
            .await;

        assert_eq!(result.rounds, 3);
        assert_eq!(ids(&result.all_fragments), vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_cancelled_rounds_are_skipped() {
        let retriever = Arc::new(KeyedRetriever::fixed(fragments(&[1])));
        let executor = executor(retriever.clone(), false);
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = executor
            .execute(&plan(&["a", "b"]), &QueryRequest::new("q"), &cancel)
            .await;

        assert_eq!(result.rounds, 0);
        assert!(result.all_fragments.is_empty());
        assert_eq!(retriever.calls(), 0);
    }

    #[tokio::test]
    async fn test_width_follows_top_k() {
        let retriever = Arc::new(KeyedRetriever::fixed(fragments(&[1, 2, 3, 4, 5, 6, 7])));
        let executor = executor(retriever.clone(), false);
        let mut request = QueryRequest::new("q");
        request.top_k = Some(12);

        let result = executor
            .execute(&plan(&["a"]), &request, &CancelToken::new())
            .await;

        assert_eq!(result.all_fragments.len(), 6);
        assert_eq!(*retriever.limits.lock().unwrap(), vec![6]);
    }
}
