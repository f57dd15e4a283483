use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::error::{Error, Result};
use crate::records::RepositoryRecord;

static ROW_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li.Box-row").expect("row selector"));

static NAME_LINK_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"a[itemprop="name codeRepository"]"#).expect("name link selector")
});

/// Extract one record per repository row.
///
/// A row without a usable name link fails the whole page; no partial list is
/// returned. A page without rows yields an empty list.
pub fn parse(body: &str, source_url: &str, site_origin: &str) -> Result<Vec<RepositoryRecord>> {
    let document = Html::parse_document(body);
    let org = organization_name(source_url);
    let origin = site_origin.trim_end_matches('/');

    document
        .select(&ROW_SEL)
        .enumerate()
        .map(|(i, row)| parse_row(row, i, source_url, &org, origin))
        .collect()
}

fn parse_row(
    row: ElementRef,
    index: usize,
    source_url: &str,
    org: &str,
    origin: &str,
) -> Result<RepositoryRecord> {
    let malformed = |problem| Error::ParseStructure {
        url: source_url.to_string(),
        row: index,
        problem,
    };

    let link = row
        .select(&NAME_LINK_SEL)
        .next()
        .ok_or_else(|| malformed("missing repository name link"))?;

    let name: String = link.text().map(str::trim).collect();
    if name.is_empty() {
        return Err(malformed("repository name link has no text"));
    }

    let href = link
        .value()
        .attr("href")
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| malformed("repository name link has no href"))?;

    Ok(RepositoryRecord::scraped(org, format!("{}{}", origin, href), name))
}

/// Organization segment of an org URL, with or without the `/repositories` suffix.
pub fn organization_name(org_url: &str) -> String {
    let trimmed = org_url.trim_end_matches('/');
    let base = trimmed.strip_suffix("/repositories").unwrap_or(trimmed);
    base.rsplit('/').next().unwrap_or_default().to_string()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const ORG_URL: &str = "https://github.com/orgs/octo-org/repositories";
    const ORIGIN: &str = "https://github.com";

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn octo_org_two_rows() {
        let records = parse(&fixture("octo_org"), ORG_URL, ORIGIN).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].repository_name, "octo-repo");
        assert_eq!(records[0].repository_id, "https://github.com/octo-org/octo-repo");
        assert_eq!(records[0].organization_name, "octo-org");
        assert_eq!(records[1].repository_name, "demo-repo");
        assert_eq!(records[1].repository_id, "https://github.com/octo-org/demo-repo");
    }

    #[test]
    fn placeholders_stay_empty() {
        let records = parse(&fixture("octo_org"), ORG_URL, ORIGIN).unwrap();
        for r in &records {
            assert!(r.repository_owner.is_empty());
            assert!(r.num_prs.is_empty());
            assert!(r.num_prs_merged.is_empty());
            assert!(r.merged_at.is_empty());
            assert!(r.is_compliant.is_empty());
        }
    }

    #[test]
    fn n_rows_in_document_order() {
        let rows: String = (0..7)
            .map(|i| {
                format!(
                    r#"<li class="Box-row d-flex"><a itemprop="name codeRepository" href="/acme/r{i}"> r{i} </a></li>"#
                )
            })
            .collect();
        let html = format!("<html><body><ul>{}</ul></body></html>", rows);

        let records = parse(&html, "https://github.com/orgs/acme", ORIGIN).unwrap();
        assert_eq!(records.len(), 7);
        for (i, r) in records.iter().enumerate() {
            assert_eq!(r.repository_name, format!("r{}", i));
            assert_eq!(r.repository_id, format!("https://github.com/acme/r{}", i));
            assert_eq!(r.organization_name, "acme");
        }
    }

    #[test]
    fn no_rows_is_empty_not_error() {
        let records = parse(&fixture("empty"), ORG_URL, ORIGIN).unwrap();
        assert!(records.is_empty());
        assert!(parse("", ORG_URL, ORIGIN).unwrap().is_empty());
    }

    #[test]
    fn missing_anchor_fails_whole_page() {
        let err = parse(&fixture("malformed"), ORG_URL, ORIGIN).unwrap_err();
        assert!(matches!(err, Error::ParseStructure { row: 1, .. }), "got {:?}", err);
    }

    #[test]
    fn other_itemprop_is_not_a_name_link() {
        let html = r#"<ul><li class="Box-row"><a itemprop="codeRepository" href="/o/x">x</a></li></ul>"#;
        assert!(matches!(
            parse(html, ORG_URL, ORIGIN),
            Err(Error::ParseStructure { row: 0, .. })
        ));
    }

    #[test]
    fn empty_href_fails() {
        let html = r#"<ul><li class="Box-row"><a itemprop="name codeRepository" href="">x</a></li></ul>"#;
        assert!(parse(html, ORG_URL, ORIGIN).is_err());
    }

    #[test]
    fn nested_text_is_trimmed_and_joined() {
        let html = r#"<ul><li class="Box-row"><a itemprop="name codeRepository" href="/o/split">
            <span> split </span>
            <em>repo</em>
        </a></li></ul>"#;
        let records = parse(html, ORG_URL, ORIGIN).unwrap();
        assert_eq!(records[0].repository_name, "splitrepo");
    }

    #[test]
    fn org_name_from_url_forms() {
        assert_eq!(organization_name("https://github.com/orgs/octo-org"), "octo-org");
        assert_eq!(organization_name("https://github.com/orgs/octo-org/"), "octo-org");
        assert_eq!(organization_name(ORG_URL), "octo-org");
        assert_eq!(organization_name("Scytale-exercise"), "Scytale-exercise");
    }

    #[test]
    fn origin_trailing_slash_is_not_doubled() {
        let records = parse(&fixture("octo_org"), ORG_URL, "https://github.com/").unwrap();
        assert_eq!(records[0].repository_id, "https://github.com/octo-org/octo-repo");
    }
}
