//! URL acceptance rules for discovered documents.

use std::fmt;

use url::Url;

/// Returns true when the URL's path ends in `.pdf` (query and fragment ignored).
///
/// ```
/// use harvester_core::is_pdf_url;
///
/// assert!(is_pdf_url("https://example.com/docs/Manual.PDF?download=1"));
/// assert!(!is_pdf_url("https://example.com/docs/manual.pdf.html"));
/// assert!(!is_pdf_url("manual.pdf"));
/// ```
#[must_use]
pub fn is_pdf_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|parsed| parsed.path().to_ascii_lowercase().ends_with(".pdf"))
}

/// Why a URL was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The path does not end in `.pdf`.
    NotPdf,
    /// The host is not one of the allowed domains.
    DomainNotAllowed,
    /// Neither a `/YYYY/` segment nor a `-YY.pdf` suffix matched.
    YearNotMatched,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotPdf => "not a PDF URL",
            Self::DomainNotAllowed => "domain not allowed",
            Self::YearNotMatched => "no matching year",
        })
    }
}

/// Domain and year heuristics applied to every candidate document URL.
///
/// An empty `allowed_domains` list allows every host. `years: None` disables
/// the year check; `Some(vec![])` rejects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkFilter {
    /// Hosts (and their subdomains) documents may come from.
    pub allowed_domains: Vec<String>,
    /// Four-digit years a document URL must mention.
    pub years: Option<Vec<String>>,
}

impl LinkFilter {
    /// A filter that only checks for `.pdf` paths.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts hosts to `domains` and their subdomains.
    #[must_use]
    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_domains = domains
            .into_iter()
            .map(|d| d.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        self
    }

    /// Requires the URL to mention one of `years`.
    #[must_use]
    pub fn with_years<I, S>(mut self, years: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.years = Some(years.into_iter().map(|y| y.as_ref().trim().to_string()).collect());
        self
    }

    /// Returns true when `url` passes every configured rule.
    #[must_use]
    pub fn accepts(&self, url: &str) -> bool {
        self.check(url).is_ok()
    }

    /// Checks `url` and reports the first rule it breaks.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] for the first failing rule, checked in the
    /// order PDF, domain, year.
    pub fn check(&self, url: &str) -> Result<(), Rejection> {
        let Ok(parsed) = Url::parse(url) else {
            return Err(Rejection::NotPdf);
        };
        let path = parsed.path().to_ascii_lowercase();
        if !path.ends_with(".pdf") {
            return Err(Rejection::NotPdf);
        }

        if !self.allowed_domains.is_empty() {
            let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
            if !self.allowed_domains.iter().any(|d| host_matches(&host, d)) {
                return Err(Rejection::DomainNotAllowed);
            }
        }

        if let Some(years) = &self.years
            && !years.iter().any(|year| mentions_year(&path, year))
        {
            return Err(Rejection::YearNotMatched);
        }

        Ok(())
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// A `/2025/` path segment, or a path ending in `-25.pdf`.
fn mentions_year(path: &str, year: &str) -> bool {
    if path.contains(&format!("/{year}/")) {
        return true;
    }
    let short = year.get(year.len().saturating_sub(2)..).unwrap_or(year);
    path.ends_with(&format!("-{short}.pdf"))
}
