use scraper::{ElementRef, Html, Selector};

use crate::schema::StandingsRow;

/// Snapshot extractor: rendered markup in, candidate rows out.
///
/// CONTRACT:
/// - Pure transform. No network, no scrolling, no shared state.
/// - For each field an ordered list of named selector strategies
///   is tried; the first strategy yielding non-empty text wins.
/// - A row with every field unresolved is dropped. A row with at
///   least one resolved field is kept, gaps stay `None`.
///
/// The selector tables target the ReactVirtualized standings
/// markup of the contest page. Only currently visible rows are
/// mounted, so one call sees one window of the leaderboard; the
/// incremental collector stitches windows together.
pub struct Extractor {
    table: Selector,
    row: Selector,
    rank: Vec<FieldStrategy>,
    team: Vec<FieldStrategy>,
    pmr: Vec<FieldStrategy>,
    fpts: Vec<FieldStrategy>,
}

/// Container of the virtualized standings table. Shared with the
/// session layer, which waits for it to mount after navigation.
pub const TABLE_CSS: &str =
    "div.ReactVirtualized__Table.ContestStandings_contest-standings-table";

/// One mounted leaderboard row. Shared with the session layer's
/// scroll script.
pub const ROW_CSS: &str = "button.ReactVirtualized__Table__row.ContestStandings_row";

/// One named extraction strategy for one field.
struct FieldStrategy {
    /// Stable name, used only in trace logging
    name: &'static str,
    selector: Selector,
}

/// Compiles a static CSS selector.
///
/// PANIC:
/// - Panics on a malformed selector literal. All inputs are
///   compile-time constants, so this is a startup invariant in
///   the same sense as installing a crypto provider.
fn sel(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

fn strategy(name: &'static str, css: &'static str) -> FieldStrategy {
    FieldStrategy { name, selector: sel(css) }
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            table: sel(TABLE_CSS),
            row: sel(ROW_CSS),
            rank: vec![strategy("rank-cell", ".ContestStandings_rank-cell")],
            team: vec![strategy("team-name-label", ".UsernameWithEntryIndex_team-name")],
            pmr: vec![
                strategy("time-remaining-cell", r#".column-timeRemaining [role="cell"] span"#),
                strategy("time-remaining-span", ".column-timeRemaining span"),
            ],
            fpts: vec![
                strategy(
                    "fpts-animated",
                    ".ContestStandings_fantasy-points-cell .AnimatedNumber_animated-number span",
                ),
                strategy(
                    "fpts-column-animated",
                    ".ContestStandings_column-fantasyPoints .AnimatedNumber_animated-number span",
                ),
                strategy("fpts-cell", ".ContestStandings_fantasy-points-cell"),
                strategy("fpts-column", ".ContestStandings_column-fantasyPoints"),
            ],
        }
    }
}

impl Extractor {
    /// Extracts the currently mounted rows from one rendered-markup
    /// string, in document order.
    pub fn extract_rows(&self, html: &str) -> Vec<StandingsRow> {
        let doc = Html::parse_document(html);

        let Some(table) = doc.select(&self.table).next() else {
            return Vec::new();
        };

        let mut rows = Vec::new();
        for el in table.select(&self.row) {
            let rank = first_text(el, &self.rank).as_deref().and_then(parse_count);
            let team_name = first_text(el, &self.team);
            let pmr = first_text(el, &self.pmr).as_deref().and_then(parse_count);
            let fpts = first_text(el, &self.fpts)
                .as_deref()
                .map(strip_fpts_label)
                .and_then(|t| first_number(&t));

            let row = StandingsRow { rank, team_name, pmr, fpts };
            if !row.is_empty() {
                rows.push(row);
            }
        }
        rows
    }
}

/// Applies the ordered strategies; first non-empty text wins.
fn first_text(row: ElementRef<'_>, strategies: &[FieldStrategy]) -> Option<String> {
    for s in strategies {
        if let Some(el) = row.select(&s.selector).next() {
            let text: String = el.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                log::trace!("field resolved via strategy {}", s.name);
                return Some(text);
            }
        }
    }
    None
}

/// Drops a trailing "FPTS" unit label so only the numeric token
/// remains.
fn strip_fpts_label(text: &str) -> String {
    text.replace("FPTS", "").trim().to_string()
}

/// Locates the first signed decimal token after stripping
/// thousands separators. Mirrors the extraction rule for every
/// numeric field: leading junk before the number is ignored,
/// everything after the token is ignored.
fn first_number(text: &str) -> Option<f64> {
    let cleaned = text.replace(',', "");
    let bytes = cleaned.as_bytes();

    let digit_at = |i: usize| bytes.get(i).is_some_and(|b| b.is_ascii_digit());

    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        let starts_token = c.is_ascii_digit()
            || ((c == '-' || c == '+') && digit_at(i + 1))
            || (c == '.' && digit_at(i + 1));

        if !starts_token {
            i += 1;
            continue;
        }

        let start = i;
        let mut seen_dot = c == '.';
        i += 1;
        while i < bytes.len() {
            let c = bytes[i] as char;
            if c.is_ascii_digit() {
                i += 1;
            } else if c == '.' && !seen_dot && digit_at(i + 1) {
                seen_dot = true;
                i += 1;
            } else {
                break;
            }
        }
        return cleaned[start..i].parse().ok();
    }
    None
}

/// Integer counts (rank, PMR). Fractional text truncates, negative
/// values are treated as unresolved since neither field admits them.
fn parse_count(text: &str) -> Option<u32> {
    let f = first_number(text)?;
    if f < 0.0 || f > u32::MAX as f64 {
        return None;
    }
    Some(f.trunc() as u32)
}
