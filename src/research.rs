//! Keyword research: turn a niche into a [`KeywordDecision`].
//!
//! Trend evidence is gathered best-effort (every sub-fetch may fail on its
//! own) and handed to the text generator together with the niche and the
//! keywords already used for it. The generator picks the keyword; this step
//! only parses and sanity-checks its answer.

use std::convert::Infallible;
use std::time::Duration;

use chrono::Utc;
use itertools::Itertools;
use tracing::{info, instrument, warn};

use crate::api::AskAsync;
use crate::error::{ResearchError, ServiceError};
use crate::json_repair::parse_generated;
use crate::models::{KeywordDecision, NicheConfig, RankedQuery, TrendDirection, TrendEvidence, TrendSignal};
use crate::retry::retry_with_delay;
use crate::services::TrendSource;
use crate::utils::{collect_best_effort, truncate_for_log};

/// Queries/topics per signal shown to the generator.
const PROMPT_LIST_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct ResearchSettings {
    pub fetch_retries: u32,
    pub fetch_retry_delay: Duration,
    /// Relative change between the old and recent window that counts as a trend.
    pub direction_threshold: f64,
    /// Points averaged at each end of the series.
    pub direction_window: usize,
    /// Rising-query growth (percent) that counts as a breakout.
    pub breakout_growth: u64,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            fetch_retries: 2,
            fetch_retry_delay: Duration::from_secs(5),
            direction_threshold: 0.2,
            direction_window: 3,
            breakout_growth: 5000,
        }
    }
}

pub fn average_interest(series: &[u32]) -> u32 {
    if series.is_empty() {
        return 0;
    }
    let sum: u64 = series.iter().map(|&v| u64::from(v)).sum();
    (sum as f64 / series.len() as f64).round() as u32
}

/// Compare the average of the last `window` points with the first `window`.
///
/// Needs at least `2 * window` points. A zero older average gives no signal.
pub fn trend_direction(series: &[u32], window: usize, threshold: f64) -> TrendDirection {
    if window == 0 || series.len() < window * 2 {
        return TrendDirection::Stable;
    }
    let mean = |points: &[u32]| points.iter().map(|&v| f64::from(v)).sum::<f64>() / points.len() as f64;
    let older = mean(&series[..window]);
    let recent = mean(&series[series.len() - window..]);
    if older <= 0.0 {
        return TrendDirection::Stable;
    }
    let change = (recent - older) / older;
    if change > threshold {
        TrendDirection::Rising
    } else if change < -threshold {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    }
}

/// True when a rising query is flagged "Breakout" or grew by at least `growth` percent.
pub fn has_breakout(rising: &[RankedQuery], growth: u64) -> bool {
    rising.iter().any(|q| {
        let formatted = q.formatted_value.trim();
        let parsed = formatted
            .chars()
            .filter(char::is_ascii_digit)
            .collect::<String>()
            .parse::<u64>()
            .ok();
        formatted.eq_ignore_ascii_case("breakout") || q.value >= growth || parsed.is_some_and(|v| v >= growth)
    })
}

pub struct KeywordResearcher {
    trends: Box<dyn TrendSource>,
    asker: Box<dyn AskAsync>,
    settings: ResearchSettings,
}

impl KeywordResearcher {
    pub fn new(trends: Box<dyn TrendSource>, asker: Box<dyn AskAsync>, settings: ResearchSettings) -> Self {
        Self {
            trends,
            asker,
            settings,
        }
    }

    async fn fetch<T, F, Fut>(&self, what: &str, term: &str, fetch: F) -> T
    where
        T: Default,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let label = format!("{what} for \"{term}\"");
        retry_with_delay(&label, self.settings.fetch_retries, self.settings.fetch_retry_delay, fetch)
            .await
            .unwrap_or_else(|e| {
                warn!(term, what, error = %e, "Trend sub-fetch failed; continuing without it");
                T::default()
            })
    }

    /// Gather one term's evidence. Never fails: missing pieces stay empty.
    #[instrument(level = "info", skip(self))]
    pub async fn signal_for(&self, term: &str) -> TrendSignal {
        let interest_over_time = self
            .fetch("interest over time", term, || self.trends.interest_over_time(term))
            .await;
        let related = self
            .fetch("related queries", term, || self.trends.related_queries(term))
            .await;
        let related_topics = self
            .fetch("related topics", term, || self.trends.related_topics(term))
            .await;

        let signal = TrendSignal {
            term: term.to_string(),
            average_interest: average_interest(&interest_over_time),
            direction: trend_direction(
                &interest_over_time,
                self.settings.direction_window,
                self.settings.direction_threshold,
            ),
            has_breakout: has_breakout(&related.rising, self.settings.breakout_growth),
            interest_over_time,
            related_topics,
            rising_queries: related.rising,
            top_queries: related.top,
        };
        info!(
            average = signal.average_interest,
            direction = %signal.direction,
            breakout = signal.has_breakout,
            rising = signal.rising_queries.len(),
            top = signal.top_queries.len(),
            topics = signal.related_topics.len(),
            "Trend signal gathered"
        );
        signal
    }

    /// Broad term first; seeds one by one when the broad term has no queries.
    #[instrument(level = "info", skip_all, fields(niche = %niche.id))]
    pub async fn gather_evidence(&self, niche: &NicheConfig) -> TrendEvidence {
        let broad = self.signal_for(&niche.broad_term).await;
        if broad.has_queries() {
            return TrendEvidence::Signals(vec![broad]);
        }

        info!("No related queries for the broad term; scanning seed keywords");
        let seeds = collect_best_effort("seed keyword", &niche.seed_keywords, |_, seed| async move {
            let signal = self.signal_for(seed).await;
            Ok::<_, Infallible>(signal.has_data().then_some(signal))
        })
        .await;

        let signals: Vec<TrendSignal> = std::iter::once(broad)
            .filter(TrendSignal::has_data)
            .chain(seeds)
            .collect();
        if signals.is_empty() {
            warn!("Every trend lookup failed or came back empty; researching without trends data");
            TrendEvidence::Unavailable
        } else {
            TrendEvidence::Signals(signals)
        }
    }

    #[instrument(level = "info", skip_all, fields(niche = %niche.id))]
    pub async fn research(&self, niche: &NicheConfig, posted: &[String]) -> Result<KeywordDecision, ResearchError> {
        let evidence = self.gather_evidence(niche).await;
        let today = Utc::now().date_naive().to_string();
        let prompt = build_research_prompt(niche, &evidence, posted, &today);

        let reply = self
            .asker
            .ask(&prompt)
            .await
            .map_err(|source| ResearchError::Generation {
                niche: niche.name.clone(),
                source,
            })?;
        let mut decision: KeywordDecision = parse_generated(&reply).map_err(|source| ResearchError::Parse {
            niche: niche.name.clone(),
            source,
        })?;

        decision.selected_keyword = decision.selected_keyword.trim().to_string();
        if decision.selected_keyword.is_empty() {
            return Err(ResearchError::EmptyKeyword {
                niche: niche.name.clone(),
            });
        }
        decision.content_type = checked_content_type(niche, &decision.content_type);

        info!(
            keyword = %decision.selected_keyword,
            content_type = %decision.content_type,
            competition = %decision.estimated_competition,
            reasoning = %truncate_for_log(&decision.reasoning, 200),
            "Keyword selected"
        );
        Ok(decision)
    }
}

/// The chosen content type if the niche allows it, else the niche's first type.
fn checked_content_type(niche: &NicheConfig, chosen: &str) -> String {
    let chosen = chosen.trim();
    match niche
        .content_types
        .iter()
        .find(|allowed| allowed.eq_ignore_ascii_case(chosen))
    {
        Some(allowed) => allowed.clone(),
        None => {
            let fallback = niche.content_types.first().cloned().unwrap_or_default();
            warn!(chosen, fallback = %fallback, "Content type not allowed for niche; using fallback");
            fallback
        }
    }
}

fn format_queries(queries: &[RankedQuery]) -> String {
    queries
        .iter()
        .take(PROMPT_LIST_LIMIT)
        .map(|q| {
            if q.formatted_value.is_empty() {
                q.query.clone()
            } else {
                format!("{} ({})", q.query, q.formatted_value)
            }
        })
        .join(", ")
}

fn format_evidence(evidence: &TrendEvidence) -> String {
    match evidence {
        TrendEvidence::Unavailable => {
            "No trends data available. Use your own knowledge to pick the best keyword from the seed keywords.".to_string()
        }
        TrendEvidence::Signals(signals) => signals
            .iter()
            .map(|s| {
                format!(
                    "- \"{}\": avg interest={}, trend={}, breakout={}, rising queries=[{}], top queries=[{}], related topics=[{}]",
                    s.term,
                    s.average_interest,
                    s.direction,
                    s.has_breakout,
                    format_queries(&s.rising_queries),
                    format_queries(&s.top_queries),
                    s.related_topics.iter().take(PROMPT_LIST_LIMIT).join(", ")
                )
            })
            .join("\n"),
    }
}

/// User prompt for the keyword-research template.
pub fn build_research_prompt(
    niche: &NicheConfig,
    evidence: &TrendEvidence,
    posted: &[String],
    today: &str,
) -> String {
    let year = today.get(..4).unwrap_or(today);
    let posted = if posted.is_empty() {
        "None yet".to_string()
    } else {
        posted.iter().map(|k| format!("- {k}")).join("\n")
    };
    let content_types = niche.content_types.join(", ");

    format!(
        "Today's date is {today}. Everything must be current for {year}.

## Niche
- Name: {name}
- Category: {category}
- Broad term: {broad}
- Seed keywords: {seeds}
- Allowed content types: {content_types}

## Google Trends data (last 12 months)
{evidence}

## Already posted keywords (do NOT pick these or close variants)
{posted}

## Selection priorities, highest first
1. Rising and breakout signals over steady-state popularity
2. Long-tail, multi-word phrasing over short head terms
3. Low estimated competition over high
4. Keywords not in the already-posted list
5. Clear informational or commercial search intent

Pick exactly one keyword and one content type from: {content_types}.
Respond with a single JSON object only:
{{\"selectedKeyword\":\"...\",\"contentType\":\"...\",\"suggestedTitle\":\"...\",\"uniqueAngle\":\"...\",\"searchIntent\":\"...\",\"estimatedCompetition\":\"low|medium|high\",\"reasoning\":\"...\",\"relatedKeywordsToInclude\":[\"...\"]}}",
        name = niche.name,
        category = niche.category,
        broad = niche.broad_term,
        seeds = niche.seed_keywords.join(", "),
        evidence = format_evidence(evidence),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepairError;
    use crate::models::{Competition, RelatedQueries};
    use crate::test_support::{FakeTrends, ScriptedAsker, niche};

    fn settings() -> ResearchSettings {
        ResearchSettings {
            fetch_retry_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn query(q: &str, value: u64, formatted: &str) -> RankedQuery {
        RankedQuery {
            query: q.to_string(),
            value,
            formatted_value: formatted.to_string(),
        }
    }

    const DECISION: &str = r#"{"selectedKeyword":" budget meal prep ","contentType":"how-to","suggestedTitle":"Budget Meal Prep","uniqueAngle":"under $30","searchIntent":"informational","estimatedCompetition":"low","reasoning":"rising","relatedKeywordsToInclude":["cheap meals"]}"#;

    #[test]
    fn direction_compares_recent_and_older_windows() {
        assert_eq!(trend_direction(&[10, 10, 10, 12, 14, 15], 3, 0.2), TrendDirection::Rising);
        assert_eq!(trend_direction(&[50, 50, 50, 30, 30, 30], 3, 0.2), TrendDirection::Declining);
        assert_eq!(trend_direction(&[50, 50, 50, 55, 55, 55], 3, 0.2), TrendDirection::Stable);
        assert_eq!(trend_direction(&[0, 0, 0, 90, 90, 90], 3, 0.2), TrendDirection::Stable);
        assert_eq!(trend_direction(&[1, 100], 3, 0.2), TrendDirection::Stable);
    }

    #[test]
    fn average_rounds() {
        assert_eq!(average_interest(&[]), 0);
        assert_eq!(average_interest(&[1, 2]), 2);
        assert_eq!(average_interest(&[10, 20, 31]), 20);
    }

    #[test]
    fn breakout_detection() {
        assert!(has_breakout(&[query("a", 0, "Breakout")], 5000));
        assert!(has_breakout(&[query("a", 5000, "+5,000%")], 5000));
        assert!(has_breakout(&[query("a", 0, "+6,500%")], 5000));
        assert!(!has_breakout(&[query("a", 250, "+250%")], 5000));
        assert!(!has_breakout(&[], 5000));
    }

    #[test]
    fn unknown_content_type_falls_back_to_first_allowed() {
        let n = niche("personal-finance");
        assert_eq!(checked_content_type(&n, "X-VS-Y"), "x-vs-y");
        assert_eq!(checked_content_type(&n, "listicle"), "how-to");
    }

    #[tokio::test]
    async fn broad_term_queries_skip_seed_scan() {
        let trends = FakeTrends::default().with_queries(
            "personal finance",
            RelatedQueries {
                top: vec![query("budgeting app", 100, "100")],
                rising: vec![query("cash stuffing", 0, "Breakout")],
            },
        )
        .with_topics("personal finance", &["Budget", "Credit card"]);
        let calls = trends.calls();
        let researcher = KeywordResearcher::new(Box::new(trends), Box::new(ScriptedAsker::replying(&[DECISION])), settings());

        let evidence = researcher.gather_evidence(&niche("personal-finance")).await;
        let TrendEvidence::Signals(signals) = evidence else {
            panic!("expected signals");
        };
        assert_eq!(signals.len(), 1);
        assert!(signals[0].has_breakout);
        assert_eq!(signals[0].related_topics, vec!["Budget", "Credit card"]);
        assert!(calls.borrow().iter().all(|c| c.ends_with(":personal finance")));
    }

    #[tokio::test]
    async fn empty_broad_term_falls_back_to_seeds_best_effort() {
        let n = niche("personal-finance");
        let trends = FakeTrends::default()
            .failing(&n.seed_keywords[0])
            .with_series(&n.seed_keywords[1], vec![10, 10, 10, 20, 20, 20]);
        let researcher = KeywordResearcher::new(Box::new(trends), Box::new(ScriptedAsker::replying(&[DECISION])), settings());

        let TrendEvidence::Signals(signals) = researcher.gather_evidence(&n).await else {
            panic!("expected signals");
        };
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].term, n.seed_keywords[1]);
        assert_eq!(signals[0].direction, TrendDirection::Rising);
    }

    #[tokio::test]
    async fn trends_outage_still_researches() {
        let n = niche("food-recipe");
        let mut trends = FakeTrends::default().failing(&n.broad_term);
        for seed in &n.seed_keywords {
            trends = trends.failing(seed);
        }
        let asker = ScriptedAsker::replying(&[DECISION]);
        let prompts = asker.prompts();
        let researcher = KeywordResearcher::new(Box::new(trends), Box::new(asker), settings());

        let decision = researcher
            .research(&n, &["easy chicken recipes".to_string()])
            .await
            .unwrap();
        assert_eq!(decision.selected_keyword, "budget meal prep");
        assert_eq!(decision.estimated_competition, Competition::Low);

        let prompt = &prompts.borrow()[0];
        assert!(prompt.contains("No trends data available"));
        assert!(prompt.contains("- easy chicken recipes"));
        assert!(prompt.contains("1. Rising and breakout signals"));
    }

    #[tokio::test]
    async fn sub_fetches_are_retried() {
        let n = niche("food-recipe");
        let trends = FakeTrends::default().failing(&n.broad_term);
        let calls = trends.calls();
        let researcher = KeywordResearcher::new(Box::new(trends), Box::new(ScriptedAsker::replying(&[DECISION])), settings());

        researcher.signal_for(&n.broad_term).await;
        let broad_calls = calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with("related_queries:"))
            .count();
        assert_eq!(broad_calls, 3, "1 attempt + 2 retries");
    }

    #[tokio::test]
    async fn unparseable_reply_is_a_research_error() {
        let researcher = KeywordResearcher::new(
            Box::new(FakeTrends::default()),
            Box::new(ScriptedAsker::replying(&["I would pick budgeting tips."])),
            settings(),
        );
        let err = researcher.research(&niche("personal-finance"), &[]).await.unwrap_err();
        assert!(matches!(
            err,
            ResearchError::Parse {
                source: RepairError::NoObject,
                ..
            }
        ));
        assert!(err.to_string().contains("Personal Finance"));
    }

    #[tokio::test]
    async fn generator_outage_is_a_research_error() {
        let researcher = KeywordResearcher::new(
            Box::new(FakeTrends::default()),
            Box::new(ScriptedAsker::failing("503 overloaded")),
            settings(),
        );
        let err = researcher.research(&niche("ai-tools-review"), &[]).await.unwrap_err();
        assert!(matches!(err, ResearchError::Generation { .. }));
    }

    #[tokio::test]
    async fn blank_keyword_is_rejected() {
        let researcher = KeywordResearcher::new(
            Box::new(FakeTrends::default()),
            Box::new(ScriptedAsker::replying(&[r#"{"selectedKeyword":"  ","contentType":"how-to"}"#])),
            settings(),
        );
        let err = researcher.research(&niche("food-recipe"), &[]).await.unwrap_err();
        assert!(matches!(err, ResearchError::EmptyKeyword { .. }));
    }
}
