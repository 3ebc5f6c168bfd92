//! Phishing Detection
//!
//! Heuristic classification of URLs and page content:
//! - Credential-harvesting URL patterns (login, password, recovery phrase, ...)
//! - Known phishing domains, updatable at runtime
//! - Scam keywords in page content
//!
//! URLs are NFKC-normalized first so full-width look-alikes match too.

use crate::utils::sanitize::normalize_url;
use lazy_static::lazy_static;
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::RwLock;

// =============================================================================
// Patterns
// =============================================================================

/// Case-insensitive URL patterns associated with credential harvesting
pub const SUSPICIOUS_URL_PATTERNS: &[&str] = &[
    r"(?i)log[-_.]?in",
    r"(?i)sign[-_.]?in",
    r"(?i)password",
    r"(?i)wallet",
    r"(?i)private[-_.]?key",
    r"(?i)recovery[-_.]?phrase",
    r"(?i)verify[-_.]?account",
];

/// Lower-case phrases that mark scam page content
pub const SCAM_CONTENT_KEYWORDS: &[&str] = &[
    "seed phrase",
    "recovery phrase",
    "private key",
    "verify your wallet",
    "wallet suspended",
    "claim your airdrop",
    "urgent action required",
    "enter your mnemonic",
];

lazy_static! {
    static ref URL_PATTERNS: RegexSet =
        RegexSet::new(SUSPICIOUS_URL_PATTERNS).expect("valid phishing patterns");
}

// =============================================================================
// Types
// =============================================================================

/// Why a URL was flagged
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhishingReason {
    /// Matched a credential-harvesting pattern
    SuspiciousPattern,
    /// Host is (a sub-domain of) a known phishing domain
    KnownPhishingDomain,
}

/// Result of checking a URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlCheckResult {
    /// URL after normalization
    pub url: String,
    pub is_suspicious: bool,
    pub reason: Option<PhishingReason>,
    /// Pattern or domain that matched
    pub matched: Option<String>,
}

impl UrlCheckResult {
    fn clean(url: String) -> Self {
        Self {
            url,
            is_suspicious: false,
            reason: None,
            matched: None,
        }
    }

    fn flagged(url: String, reason: PhishingReason, matched: impl Into<String>) -> Self {
        Self {
            url,
            is_suspicious: true,
            reason: Some(reason),
            matched: Some(matched.into()),
        }
    }
}

// =============================================================================
// Phishing Detector
// =============================================================================

/// Phishing detection engine
#[derive(Debug, Default)]
pub struct PhishingDetector {
    /// Blocklisted domains (lower case)
    domain_blocklist: RwLock<HashSet<String>>,
}

impl PhishingDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with an initial domain blocklist
    pub fn with_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let detector = Self::new();
        detector.update_phishing_domains(domains);
        detector
    }

    /// True if the URL matches a pattern or a blocked domain
    pub fn is_suspicious(&self, url: &str) -> bool {
        self.check_url(url).is_suspicious
    }

    /// Classify a URL, reporting what matched
    pub fn check_url(&self, url: &str) -> UrlCheckResult {
        let normalized = normalize_url(url);

        if let Some(index) = URL_PATTERNS.matches(&normalized).iter().next() {
            return UrlCheckResult::flagged(
                normalized,
                PhishingReason::SuspiciousPattern,
                SUSPICIOUS_URL_PATTERNS[index],
            );
        }

        if let Some(host) = extract_host(&normalized) {
            if let Some(domain) = self.blocked_domain_for(&host) {
                return UrlCheckResult::flagged(normalized, PhishingReason::KnownPhishingDomain, domain);
            }
        }

        UrlCheckResult::clean(normalized)
    }

    /// True if the text contains any scam keyword
    pub fn analyze_content(&self, text: &str) -> bool {
        !self.content_findings(text).is_empty()
    }

    /// Scam keywords present in the text
    pub fn content_findings(&self, text: &str) -> Vec<&'static str> {
        let lower = text.to_lowercase();
        SCAM_CONTENT_KEYWORDS
            .iter()
            .copied()
            .filter(|keyword| lower.contains(keyword))
            .collect()
    }

    /// Add domains to the blocklist, returning how many were new
    pub fn update_phishing_domains<I, S>(&self, domains: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Ok(mut blocklist) = self.domain_blocklist.write() else { return 0 };
        domains
            .into_iter()
            .filter_map(|d| normalize_domain(d.as_ref()))
            .filter(|d| blocklist.insert(d.clone()))
            .count()
    }

    /// Remove a domain from the blocklist
    pub fn remove_phishing_domain(&self, domain: &str) -> bool {
        let Some(domain) = normalize_domain(domain) else { return false };
        let Ok(mut blocklist) = self.domain_blocklist.write() else { return false };
        blocklist.remove(&domain)
    }

    /// Exact host or sub-domain match against the blocklist
    pub fn is_blocked_domain(&self, host: &str) -> bool {
        normalize_domain(host).is_some_and(|h| self.blocked_domain_for(&h).is_some())
    }

    pub fn blocked_domain_count(&self) -> usize {
        self.domain_blocklist.read().map(|b| b.len()).unwrap_or(0)
    }

    // =========================================================================
    // Private Methods
    // =========================================================================

    fn blocked_domain_for(&self, host: &str) -> Option<String> {
        let blocklist = self.domain_blocklist.read().ok()?;
        if blocklist.contains(host) {
            return Some(host.to_string());
        }

        // Walk parent domains: a.b.example.com -> b.example.com -> example.com
        let mut rest = host;
        while let Some((_, parent)) = rest.split_once('.') {
            if blocklist.contains(parent) {
                return Some(parent.to_string());
            }
            rest = parent;
        }
        None
    }
}

fn normalize_domain(domain: &str) -> Option<String> {
    let trimmed = domain.trim().trim_start_matches("*.").trim_end_matches('.');
    if trimmed.is_empty() || trimmed.contains('/') {
        return None;
    }
    Some(trimmed.to_lowercase())
}

/// Host of a URL; bare domains are accepted too
fn extract_host(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| url::Url::parse(&format!("https://{}", url)).ok())?;
    parsed
        .host_str()
        .map(|h| h.trim_end_matches('.').to_lowercase())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legitimate_url() {
        let detector = PhishingDetector::new();
        assert!(!detector.is_suspicious("https://app.uniswap.org"));
        assert!(!detector.is_suspicious("https://etherscan.io/tx/0xabc"));
    }

    #[test]
    fn test_suspicious_patterns() {
        let detector = PhishingDetector::new();
        assert!(detector.is_suspicious("https://example.com/login"));
        assert!(detector.is_suspicious("https://example.com/Sign-In"));
        assert!(detector.is_suspicious("https://reset-PASSWORD.io"));
        assert!(detector.is_suspicious("https://my-wallet-sync.app"));
        assert!(detector.is_suspicious("https://x.io/enter_private_key"));
        assert!(detector.is_suspicious("https://x.io/recovery-phrase"));
        assert!(detector.is_suspicious("https://x.io/verify-account?id=1"));

        let result = detector.check_url("https://example.com/login");
        assert_eq!(result.reason, Some(PhishingReason::SuspiciousPattern));
        assert!(result.matched.unwrap().contains("log"));
    }

    #[test]
    fn test_fullwidth_lookalike_is_normalized() {
        let detector = PhishingDetector::new();
        // Full-width "login"
        assert!(detector.is_suspicious("https://example.com/ｌｏｇｉｎ"));
    }

    #[test]
    fn test_blocked_domains() {
        let detector = PhishingDetector::new();
        assert_eq!(
            detector.update_phishing_domains(["Uniswap-Airdrop.xyz", "*.evil.io", "evil.io", ""]),
            2
        );
        assert_eq!(detector.blocked_domain_count(), 2);

        let result = detector.check_url("https://uniswap-airdrop.xyz/claim");
        assert!(result.is_suspicious);
        assert_eq!(result.reason, Some(PhishingReason::KnownPhishingDomain));

        // Sub-domain match, but not a look-alike suffix
        assert!(detector.is_suspicious("https://app.evil.io"));
        assert!(!detector.is_suspicious("https://notevil.io"));
        assert!(detector.is_blocked_domain("cdn.app.evil.io"));

        // Bare domain input
        assert!(detector.is_suspicious("evil.io"));

        assert!(detector.remove_phishing_domain("EVIL.io"));
        assert!(!detector.is_suspicious("https://app.evil.io"));
        assert!(!detector.remove_phishing_domain("evil.io"));
    }

    #[test]
    fn test_analyze_content() {
        let detector = PhishingDetector::new();
        assert!(detector.analyze_content("URGENT ACTION REQUIRED: your wallet will be closed"));
        assert!(detector.analyze_content("Please enter your Seed Phrase to continue"));
        assert!(!detector.analyze_content("Swap tokens with low fees"));

        let findings = detector.content_findings("Wallet suspended. Enter your mnemonic now.");
        assert_eq!(findings, vec!["wallet suspended", "enter your mnemonic"]);
    }

    #[test]
    fn test_with_domains() {
        let detector = PhishingDetector::with_domains(vec!["metamask-support.com".to_string()]);
        assert!(detector.is_suspicious("https://metamask-support.com/help"));
    }
}
