use crate::aggregate::MetricSet;
use crate::error::{InsightsError, Result};
use crate::types::{Column, HeadlineRow};
use crate::util::{average, format_int, format_number, median, title_case};
use serde::Serialize;
use std::collections::HashMap;

/// Winner of one statistic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Headline {
    pub statistic: String,
    pub group: String,
    pub value: f64,
    /// Lowest group, used by "needs attention" lines.
    pub lowest_group: String,
    pub lowest_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupShare {
    pub group: String,
    pub count: usize,
    /// Percentage of all rows in the aggregated table.
    pub share: f64,
}

/// Insight report over one `MetricSet`. Built fresh for every aggregation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub title: String,
    pub group_by: Column,
    pub total_rows: usize,
    pub group_count: usize,
    pub mean_per_group: f64,
    pub median_per_group: f64,
    /// Largest group by row count.
    pub top_count: GroupShare,
    /// Every group, largest first.
    pub shares: Vec<GroupShare>,
    /// One entry per statistic that has at least one value, in measure order.
    pub headlines: Vec<Headline>,
    pub narrative: String,
}

impl Report {
    pub fn headline(&self, statistic: &str) -> Option<&Headline> {
        self.headlines.iter().find(|h| h.statistic == statistic)
    }

    pub fn headline_rows(&self) -> Vec<HeadlineRow> {
        let mut rows = vec![
            HeadlineRow {
                metric: format!("total {}s", self.group_by),
                group: "-".to_string(),
                value: format_int(self.group_count),
            },
            HeadlineRow {
                metric: "largest group".to_string(),
                group: self.top_count.group.clone(),
                value: format!(
                    "{} ({}%)",
                    format_int(self.top_count.count),
                    format_number(self.top_count.share, 1)
                ),
            },
        ];
        rows.extend(self.headlines.iter().map(|h| HeadlineRow {
            metric: format!("top {}", h.statistic),
            group: h.group.clone(),
            value: format_number(h.value, 1),
        }));
        rows
    }
}

/// A narrative line: plain text with `{slot}` placeholders, or a line
/// repeated once per group with the `{group}`, `{count}` and `{share}` slots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Line {
    Text(String),
    PerGroup(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub heading: String,
    pub lines: Vec<Line>,
}

/// Narrative template as data.
///
/// Slots available to [`Line::Text`]:
/// `{total}`, `{groups}`, `{mean_per_group}`, `{median_per_group}`,
/// `{top_count.group}`, `{top_count.count}`, `{top_count.share}`, and per
/// statistic `{<name>.group}`, `{<name>.value}`, `{<name>.lowest_group}`,
/// `{<name>.lowest_value}`. A statistic without values renders `n/a`.
/// Appending `|title` to a slot title-cases its value (`{kpi_rate.group|title}`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportTemplate {
    pub title: String,
    pub sections: Vec<Section>,
}

impl ReportTemplate {
    pub fn new(title: impl Into<String>) -> ReportTemplate {
        ReportTemplate {
            title: title.into(),
            sections: Vec::new(),
        }
    }

    pub fn section(mut self, heading: impl Into<String>, lines: Vec<Line>) -> ReportTemplate {
        self.sections.push(Section {
            heading: heading.into(),
            lines,
        });
        self
    }

    fn render(&self, slots: &HashMap<String, String>, shares: &[GroupShare]) -> Result<String> {
        let mut out = String::new();
        out.push_str(&self.title);
        out.push('\n');
        for section in &self.sections {
            out.push('\n');
            out.push_str(&format!("**{}:**\n", section.heading));
            for line in &section.lines {
                match line {
                    Line::Text(text) => {
                        out.push_str("- ");
                        out.push_str(&fill(text, |name| slots.get(name).cloned())?);
                        out.push('\n');
                    }
                    Line::PerGroup(text) => {
                        for s in shares {
                            let filled = fill(text, |name| match name {
                                "group" => Some(s.group.clone()),
                                "count" => Some(format_int(s.count)),
                                "share" => Some(format_number(s.share, 1)),
                                other => slots.get(other).cloned(),
                            })?;
                            out.push_str("- ");
                            out.push_str(&filled);
                            out.push('\n');
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

pub fn text(s: &str) -> Line {
    Line::Text(s.to_string())
}

pub fn per_group(s: &str) -> Line {
    Line::PerGroup(s.to_string())
}

/// Replace every `{name}` in `template` through `lookup`.
fn fill<F>(template: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| {
            InsightsError::InvalidParameter(format!("unclosed slot in template line '{}'", template))
        })?;
        let (name, modifier) = match after[..end].split_once('|') {
            Some((name, modifier)) => (name.trim(), Some(modifier.trim())),
            None => (after[..end].trim(), None),
        };
        let value = lookup(name).ok_or_else(|| {
            InsightsError::InvalidParameter(format!("unknown template slot '{}'", name))
        })?;
        match modifier {
            None => out.push_str(&value),
            Some("title") => out.push_str(&title_case(&value)),
            Some(other) => {
                return Err(InsightsError::InvalidParameter(format!(
                    "unknown slot modifier '{}' on '{}'",
                    other, name
                )))
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Build the report for `metrics`.
///
/// Winners are argmax per statistic with ties going to the group that comes
/// first in the table (the order of `metrics.groups`). An empty `MetricSet`
/// is an `EmptyResult` error; nothing is computed over zero groups.
pub fn summarize(metrics: &MetricSet, template: &ReportTemplate) -> Result<Report> {
    if metrics.is_empty() || metrics.total_rows == 0 {
        return Err(InsightsError::EmptyResult(format!(
            "no {} groups left to summarize",
            metrics.group_by
        )));
    }

    let total = metrics.total_rows;
    let share = |count: usize| count as f64 / total as f64 * 100.0;

    let shares: Vec<GroupShare> = metrics
        .value_counts()
        .into_iter()
        .map(|(group, count)| GroupShare {
            group,
            count,
            share: share(count),
        })
        .collect();
    // value_counts is a stable sort, so the first entry is the first largest group
    let top_count = shares[0].clone();

    let sizes: Vec<f64> = metrics.group_sizes.iter().map(|n| *n as f64).collect();
    let group_count = metrics.groups.len();
    let mean_per_group = average(&sizes).unwrap_or(0.0);
    let median_per_group = median(sizes).unwrap_or(0.0);

    let headlines: Vec<Headline> = metrics
        .statistics
        .iter()
        .filter_map(|s| {
            let (group, value) = s.argmax()?;
            let (lowest_group, lowest_value) = s.argmin()?;
            Some(Headline {
                statistic: s.name.clone(),
                group: group.to_string(),
                value,
                lowest_group: lowest_group.to_string(),
                lowest_value,
            })
        })
        .collect();

    let mut slots: HashMap<String, String> = HashMap::new();
    slots.insert("total".into(), format_int(total));
    slots.insert("groups".into(), format_int(group_count));
    slots.insert("mean_per_group".into(), format_number(mean_per_group, 1));
    slots.insert("median_per_group".into(), format_number(median_per_group, 1));
    slots.insert("top_count.group".into(), top_count.group.clone());
    slots.insert("top_count.count".into(), format_int(top_count.count));
    slots.insert("top_count.share".into(), format_number(top_count.share, 1));
    for s in &metrics.statistics {
        for suffix in ["group", "value", "lowest_group", "lowest_value"] {
            slots.insert(format!("{}.{}", s.name, suffix), "n/a".to_string());
        }
    }
    for h in &headlines {
        slots.insert(format!("{}.group", h.statistic), h.group.clone());
        slots.insert(format!("{}.value", h.statistic), format_number(h.value, 1));
        slots.insert(format!("{}.lowest_group", h.statistic), h.lowest_group.clone());
        slots.insert(
            format!("{}.lowest_value", h.statistic),
            format_number(h.lowest_value, 1),
        );
    }

    let narrative = template.render(&slots, &shares)?;

    Ok(Report {
        title: template.title.clone(),
        group_by: metrics.group_by,
        total_rows: total,
        group_count,
        mean_per_group,
        median_per_group,
        top_count,
        shares,
        headlines,
        narrative,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{Reduction, Statistic};
    use pretty_assertions::assert_eq;

    fn stat(name: &str, values: &[(&str, f64)]) -> Statistic {
        Statistic {
            name: name.to_string(),
            column: Column::AvgTrainingScore,
            reduction: Reduction::Mean,
            values: values.iter().map(|(g, v)| (g.to_string(), *v)).collect(),
        }
    }

    fn metrics() -> MetricSet {
        MetricSet {
            group_by: Column::Department,
            groups: vec!["A".into(), "B".into()],
            group_sizes: vec![2, 1],
            total_rows: 3,
            statistics: vec![
                stat("rate", &[("A", 50.0), ("B", 100.0)]),
                stat("score", &[("A", 70.0), ("B", 90.0)]),
            ],
        }
    }

    fn template() -> ReportTemplate {
        ReportTemplate::new("Insights")
            .section(
                "Distribution",
                vec![text("Largest: {top_count.group} ({top_count.count}), {top_count.share}% of {total}")],
            )
            .section(
                "Performance",
                vec![
                    text("Best rate: {rate.group} ({rate.value}%)"),
                    text("Best score: {score.group} ({score.value})"),
                ],
            )
            .section("Recommendations", vec![text("Mentor {top_count.group}")])
    }

    #[test]
    fn picks_winners_and_share() {
        let r = summarize(&metrics(), &template()).unwrap();
        assert_eq!(r.top_count.group, "A");
        assert_eq!(r.top_count.count, 2);
        assert!((r.top_count.share - 66.666).abs() < 0.01);
        assert_eq!(r.headline("rate").unwrap().group, "B");
        assert_eq!(r.headline("score").unwrap().group, "B");
        assert_eq!(r.headline("score").unwrap().lowest_group, "A");
        assert!(r.narrative.contains("Largest: A (2), 66.7% of 3"));
        assert!(r.narrative.contains("Best rate: B (100.0%)"));
        assert!(r.narrative.contains("Best score: B (90.0)"));
        assert!(r.narrative.contains("- Mentor A"));
    }

    #[test]
    fn single_group_wins_everything() {
        let m = MetricSet {
            group_by: Column::Region,
            groups: vec!["r1".into()],
            group_sizes: vec![4],
            total_rows: 4,
            statistics: vec![stat("rate", &[("r1", 10.0)]), stat("score", &[("r1", 55.0)])],
        };
        let r = summarize(&m, &template()).unwrap();
        assert_eq!(r.top_count.group, "r1");
        assert_eq!(r.top_count.share, 100.0);
        assert!(r.headlines.iter().all(|h| h.group == "r1"));
    }

    #[test]
    fn empty_metric_set_is_an_error() {
        let m = MetricSet {
            group_by: Column::Gender,
            groups: vec![],
            group_sizes: vec![],
            total_rows: 0,
            statistics: vec![stat("rate", &[]), stat("score", &[])],
        };
        let err = summarize(&m, &template()).unwrap_err();
        assert_eq!(err.error_code(), "EMPTY_RESULT");
    }

    #[test]
    fn statistic_without_values_renders_na() {
        let mut m = metrics();
        m.statistics[1].values.clear();
        let r = summarize(&m, &template()).unwrap();
        assert!(r.headline("score").is_none());
        assert!(r.narrative.contains("Best score: n/a (n/a)"));
    }

    #[test]
    fn ties_go_to_first_group() {
        let mut m = metrics();
        m.group_sizes = vec![1, 1];
        m.total_rows = 2;
        m.statistics[0] = stat("rate", &[("A", 80.0), ("B", 80.0)]);
        let r = summarize(&m, &template()).unwrap();
        assert_eq!(r.top_count.group, "A");
        assert_eq!(r.headline("rate").unwrap().group, "A");
    }

    #[test]
    fn per_group_lines_expand() {
        let t = ReportTemplate::new("Shares")
            .section("Distribution", vec![per_group("{group}: {count} ({share}%)")]);
        let r = summarize(&metrics(), &t).unwrap();
        assert_eq!(
            r.narrative,
            "Shares\n\n**Distribution:**\n- A: 2 (66.7%)\n- B: 1 (33.3%)\n"
        );
    }

    #[test]
    fn unknown_slot_is_invalid() {
        let t = ReportTemplate::new("x").section("s", vec![text("{kpi.group}")]);
        let err = summarize(&metrics(), &t).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
        let t = ReportTemplate::new("x").section("s", vec![text("{rate.group")]);
        assert!(summarize(&metrics(), &t).is_err());
    }

    #[test]
    fn group_count_statistics() {
        let r = summarize(&metrics(), &template()).unwrap();
        assert_eq!(r.group_count, 2);
        assert_eq!(r.mean_per_group, 1.5);
        assert_eq!(r.median_per_group, 1.5);
    }

    #[test]
    fn title_modifier_capitalizes_slot_values() {
        let mut m = metrics();
        m.groups = vec!["f".into(), "m".into()];
        m.statistics[0] = stat("rate", &[("f", 50.0), ("m", 100.0)]);
        let t = ReportTemplate::new("x").section(
            "s",
            vec![text("{rate.group|title} leads, {rate.lowest_group} trails")],
        );
        let r = summarize(&m, &t).unwrap();
        assert!(r.narrative.contains("- M leads, f trails"));

        let t = ReportTemplate::new("x").section("s", vec![text("{rate.group|shout}")]);
        let err = summarize(&m, &t).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }
}
