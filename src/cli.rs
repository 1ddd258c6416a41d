//! Command-line interface definitions for trendpress.
//!
//! Every option can be given as a flag or as an environment variable, and a
//! `.env` file in the working directory is loaded before parsing.

use clap::Parser;

/// Command-line arguments for one batch run.
///
/// # Examples
///
/// ```sh
/// # Everything from the environment / .env
/// trendpress
///
/// # One-off run against a staging site, keeping a report
/// trendpress --wp-url https://staging.example.com --report-dir ./reports
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// WordPress site URL
    #[arg(long, env = "WP_URL")]
    pub wp_url: String,

    /// WordPress user that owns the application password
    #[arg(long, env = "WP_USERNAME")]
    pub wp_username: String,

    /// WordPress application password
    #[arg(long, env = "WP_APP_PASSWORD", hide_env_values = true)]
    pub wp_app_password: String,

    /// Gemini API key used for image generation
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: String,

    /// Gemini model that returns inline images
    #[arg(long, env = "GEMINI_IMAGE_MODEL", default_value = crate::services::gemini::DEFAULT_MODEL)]
    pub gemini_image_model: String,

    /// Google Trends region
    #[arg(long, env = "TRENDS_GEO", default_value = "US")]
    pub trends_geo: String,

    /// Author name for the byline appended to every post
    #[arg(long, env = "SITE_OWNER")]
    pub site_owner: Option<String>,

    /// DeepL API key (enables Korean machine translation)
    #[arg(long, env = "DEEPL_API_KEY", hide_env_values = true)]
    pub deepl_api_key: Option<String>,

    /// IndexNow key (enables search engine notification)
    #[arg(long, env = "INDEXNOW_KEY", hide_env_values = true)]
    pub indexnow_key: Option<String>,

    /// X user access token (enables promotion tweets)
    #[arg(long, env = "X_BEARER_TOKEN", hide_env_values = true)]
    pub x_bearer_token: Option<String>,

    /// YAML file listing the niches to process
    #[arg(short, long, env = "NICHES_FILE", default_value = "niches.yaml")]
    pub niches_file: String,

    /// Post history ledger
    #[arg(long, env = "HISTORY_FILE", default_value = "data/post-history.json")]
    pub history_file: String,

    /// Directory for JSON run reports (none written when unset)
    #[arg(short, long, env = "REPORT_DIR")]
    pub report_dir: Option<String>,

    /// Minimum number of image prompts per article
    #[arg(long, env = "MIN_IMAGE_PROMPTS", default_value_t = 4)]
    pub min_image_prompts: usize,

    /// Optional path to the awful_aj config.yaml
    #[arg(short, long, env = "AJ_CONFIG")]
    pub config: Option<String>,

    /// Chat template used for keyword research
    #[arg(long, env = "RESEARCH_TEMPLATE", default_value = "trendpress_keyword_research")]
    pub research_template: String,

    /// Chat template used for article writing
    #[arg(long, env = "CONTENT_TEMPLATE", default_value = "trendpress_content_writer")]
    pub content_template: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 9] = [
        "trendpress",
        "--wp-url",
        "https://blog.example",
        "--wp-username",
        "editor",
        "--wp-app-password",
        "abcd efgh",
        "--gemini-api-key",
        "g-key",
    ];

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(REQUIRED).unwrap();

        assert_eq!(cli.wp_url, "https://blog.example");
        assert_eq!(cli.wp_app_password, "abcd efgh");
        assert_eq!(cli.niches_file, "niches.yaml");
        assert_eq!(cli.min_image_prompts, 4);
        assert_eq!(cli.research_template, "trendpress_keyword_research");
    }

    #[test]
    fn test_cli_short_flags() {
        let mut args = REQUIRED.to_vec();
        args.extend(["-n", "/tmp/niches.yaml", "-r", "/tmp/reports", "--min-image-prompts", "5"]);
        let cli = Cli::try_parse_from(args).unwrap();

        assert_eq!(cli.niches_file, "/tmp/niches.yaml");
        assert_eq!(cli.report_dir.as_deref(), Some("/tmp/reports"));
        assert_eq!(cli.min_image_prompts, 5);
    }

    #[test]
    fn test_cli_requires_wordpress_credentials() {
        let result = Cli::try_parse_from(["trendpress", "--wp-url", "https://blog.example"]);
        assert!(result.is_err());
    }
}
