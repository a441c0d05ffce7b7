//! Sixteen-topic investment analysis of a single stock or company.

use crate::topic::{Topic, aggregator_template};

pub const GROUP_NAME: &str = "ParallelAnalysisTeam";
pub const PIPELINE_NAME: &str = "InvestmentAnalysisSystem";
pub const AGGREGATOR_NAME: &str = "InvestmentAggregator";
pub const AGGREGATOR_KEY: &str = "investment_recommendation";

const AGGREGATOR_INTRO: &str =
    "Synthesize all the research findings into a comprehensive investment analysis:";
const AGGREGATOR_CLOSING: &str = "Provide a clear investment recommendation: BUY, HOLD, or AVOID.
Explain the key reasons for your recommendation.
Highlight the main risks and opportunities.
Summary should be around 400-500 words.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvestmentTopic {
    BusinessUnderstanding,
    CompetitiveAdvantage,
    MediaSentiment,
    Ethics,
    InvestmentHorizon,
    InsiderTrading,
    GoogleTrends,
    ShareDilution,
    ShortInterest,
    DebtAnalysis,
    InfiniteGame,
    CeoAnalysis,
    AnalystRatings,
    TechnicalAnalysis,
    ReverseAnalysis,
    BondCorrelation,
}

impl InvestmentTopic {
    /// Declaration order; the report and the aggregator follow it.
    pub const ALL: [InvestmentTopic; 16] = [
        InvestmentTopic::BusinessUnderstanding,
        InvestmentTopic::CompetitiveAdvantage,
        InvestmentTopic::MediaSentiment,
        InvestmentTopic::Ethics,
        InvestmentTopic::InvestmentHorizon,
        InvestmentTopic::InsiderTrading,
        InvestmentTopic::GoogleTrends,
        InvestmentTopic::ShareDilution,
        InvestmentTopic::ShortInterest,
        InvestmentTopic::DebtAnalysis,
        InvestmentTopic::InfiniteGame,
        InvestmentTopic::CeoAnalysis,
        InvestmentTopic::AnalystRatings,
        InvestmentTopic::TechnicalAnalysis,
        InvestmentTopic::ReverseAnalysis,
        InvestmentTopic::BondCorrelation,
    ];
}

impl Topic for InvestmentTopic {
    fn agent_name(self) -> &'static str {
        match self {
            Self::BusinessUnderstanding => "BusinessUnderstandingAgent",
            Self::CompetitiveAdvantage => "CompetitiveAdvantageAgent",
            Self::MediaSentiment => "MediaSentimentAgent",
            Self::Ethics => "EthicsAgent",
            Self::InvestmentHorizon => "InvestmentHorizonAgent",
            Self::InsiderTrading => "InsiderTradingAgent",
            Self::GoogleTrends => "GoogleTrendsAgent",
            Self::ShareDilution => "ShareDilutionAgent",
            Self::ShortInterest => "ShortInterestAgent",
            Self::DebtAnalysis => "DebtAnalysisAgent",
            Self::InfiniteGame => "InfiniteGameAgent",
            Self::CeoAnalysis => "CEOAnalysisAgent",
            Self::AnalystRatings => "AnalystRatingsAgent",
            Self::TechnicalAnalysis => "TechnicalAnalysisAgent",
            Self::ReverseAnalysis => "ReverseAnalysisAgent",
            Self::BondCorrelation => "BondCorrelationAgent",
        }
    }

    fn output_key(self) -> &'static str {
        match self {
            Self::BusinessUnderstanding => "business_understanding",
            Self::CompetitiveAdvantage => "competitive_advantage",
            Self::MediaSentiment => "media_sentiment",
            Self::Ethics => "ethics_check",
            Self::InvestmentHorizon => "investment_horizon",
            Self::InsiderTrading => "insider_trading",
            Self::GoogleTrends => "google_trends",
            Self::ShareDilution => "share_dilution",
            Self::ShortInterest => "short_interest",
            Self::DebtAnalysis => "debt_analysis",
            Self::InfiniteGame => "infinite_game",
            Self::CeoAnalysis => "ceo_analysis",
            Self::AnalystRatings => "analyst_ratings",
            Self::TechnicalAnalysis => "technical_analysis",
            Self::ReverseAnalysis => "reverse_analysis",
            Self::BondCorrelation => "bond_correlation",
        }
    }

    fn heading(self) -> &'static str {
        match self {
            Self::BusinessUnderstanding => "Business Understanding",
            Self::CompetitiveAdvantage => "Competitive Advantage",
            Self::MediaSentiment => "Media Sentiment",
            Self::Ethics => "Ethics Check",
            Self::InvestmentHorizon => "Investment Horizon",
            Self::InsiderTrading => "Insider Trading",
            Self::GoogleTrends => "Google Trends",
            Self::ShareDilution => "Share Dilution",
            Self::ShortInterest => "Short Interest",
            Self::DebtAnalysis => "Debt Analysis",
            Self::InfiniteGame => "Infinite Game",
            Self::CeoAnalysis => "CEO Analysis",
            Self::AnalystRatings => "Analyst Ratings",
            Self::TechnicalAnalysis => "Technical Analysis",
            Self::ReverseAnalysis => "Reverse Analysis",
            Self::BondCorrelation => "Bond Correlation",
        }
    }

    fn template(self) -> &'static str {
        match self {
            Self::BusinessUnderstanding => {
                "Research and explain what {subject} does and its industry.
Answer: Do you understand their business model? What products/services do they offer?
What industry are they in? Keep concise (150 words)."
            }
            Self::CompetitiveAdvantage => {
                "Research {subject}'s unique competitive advantages.
What makes them different from competitors? What is their moat?
Do they have patents, brand power, network effects, or cost advantages?
Keep concise (150 words)."
            }
            Self::MediaSentiment => {
                "Search for recent news headlines about {subject}.
Analyze the sentiment: Is the media coverage positive, negative, or mixed?
What are the main topics in the news? Any controversies or achievements?
Keep concise (150 words)."
            }
            Self::Ethics => {
                "Research if {subject} has any ethical concerns, controversies,
or scandals. Check for labor practices, environmental issues, legal problems,
or unethical behavior. Is this a company with good values?
Keep concise (150 words)."
            }
            Self::InvestmentHorizon => {
                "Research if {subject} is suitable for long-term investment (5+ years).
Check their long-term strategy, market trends, growth potential, and sustainability.
Would you want to hold this stock for more than 5 years?
Keep concise (150 words)."
            }
            Self::InsiderTrading => {
                "Search for information about congressional trading and insider activity
for {subject}. Check sites like housestockwatcher.com or quiverquant.com.
Are congresspeople or insiders buying or selling? What does this signal?
Keep concise (150 words)."
            }
            Self::GoogleTrends => {
                "Research Google Trends data for {subject}.
Is interest in the company/brand growing or declining?
What does search trend data tell us about public interest?
Keep concise (100 words)."
            }
            Self::ShareDilution => {
                "Research how many new shares {subject} is issuing.
Check for stock dilution, share buybacks, or new offerings.
Is the share count increasing (bad for investors) or decreasing (good)?
Keep concise (150 words)."
            }
            Self::ShortInterest => {
                "Research the short interest for {subject}.
What percentage of shares are being shorted? Is this high or low?
What does this indicate about market sentiment?
Keep concise (150 words)."
            }
            Self::DebtAnalysis => {
                "Research {subject}'s debt levels.
How much debt do they have? What is their debt-to-equity ratio?
How long would it take them to pay off their debt with current earnings?
Is the debt manageable or concerning?
Keep concise (150 words)."
            }
            Self::InfiniteGame => {
                "Research if {subject} is focused on long-term success vs short-term profits.
Do they reinvest in R&D, employees, and innovation?
Are they building for the future or maximizing quarterly earnings?
Keep concise (150 words)."
            }
            Self::CeoAnalysis => {
                "Research {subject}'s CEO and leadership team.
Who is the CEO? What is their background and track record?
Are they focused on long-term value creation or short-term gains?
Do they have skin in the game (own significant shares)?
Keep concise (150 words)."
            }
            Self::AnalystRatings => {
                "Search for analyst ratings and scores from Danelfin, TipRanks,
and GuruFocus for {subject}. What are the consensus ratings?
What do professional analysts think about this company?
Keep concise (150 words)."
            }
            Self::TechnicalAnalysis => {
                "Research technical indicators for {subject}, especially RSI
(Relative Strength Index). Is the stock overbought or oversold?
What do the technical charts suggest?
Keep concise (150 words)."
            }
            Self::ReverseAnalysis => {
                "If {subject} has dropped recently, research WHY.
What caused the decline? Is it temporary or fundamental?
Do your homework on recent price movements and catalysts.
Keep concise (150 words)."
            }
            Self::BondCorrelation => {
                "Research how the 10-year US Treasury bond yields affect {subject}.
Is this company sensitive to interest rate changes?
How does rising/falling bond yields impact the stock price?
Keep concise (100 words)."
            }
        }
    }
}

pub fn aggregator_instruction() -> String {
    aggregator_template(AGGREGATOR_INTRO, &InvestmentTopic::ALL, AGGREGATOR_CLOSING)
}

pub fn kickoff_prompt(subject: &str) -> String {
    format!(
        "Analyze the investment potential of {subject}. \
         Cover the company from every research angle, \
         then provide a clear investment recommendation."
    )
}
