//! The weight-loss onboarding sequence: four emails on days 0 through 3
//! after the anchor date.

use chrono::NaiveDate;

use crate::clock::{add_days, days_between};

const NAME_PLACEHOLDER: &str = "{{first_name}}";

#[derive(Debug, PartialEq, Eq)]
pub struct DripTemplate {
    /// 0-based position in the sequence.
    pub step_number: u8,
    /// Days after the anchor date on which this step becomes due.
    pub day_offset: i64,
    pub subject: &'static str,
    body_template: &'static str,
}

impl DripTemplate {
    /// 1-based position shown to staff ("Part 2 of 4").
    pub fn display_number(&self) -> u8 {
        self.step_number + 1
    }

    /// Body HTML with the greeting filled in.
    pub fn render(&self, first_name: &str) -> String {
        self.body_template
            .replace(NAME_PLACEHOLDER, &escape_html(first_name))
    }

    /// `None` when the anchor sits at the very end of the calendar.
    pub fn due_on(&self, anchor: NaiveDate) -> Option<NaiveDate> {
        add_days(anchor, self.day_offset)
    }
}

pub static CATALOG: [DripTemplate; 4] = [
    DripTemplate {
        step_number: 0,
        day_offset: 0,
        subject: "Your Weight Loss Journey Starts Here",
        body_template: include_str!("templates/step1_welcome.html"),
    },
    DripTemplate {
        step_number: 1,
        day_offset: 1,
        subject: "Fuel Your Weight Loss: What to Eat",
        body_template: include_str!("templates/step2_nutrition.html"),
    },
    DripTemplate {
        step_number: 2,
        day_offset: 2,
        subject: "Feeling Nauseous? Here's What Helps",
        body_template: include_str!("templates/step3_side_effects.html"),
    },
    DripTemplate {
        step_number: 3,
        day_offset: 3,
        subject: "The Final Piece: Exercise & Supplements",
        body_template: include_str!("templates/step4_exercise.html"),
    },
];

/// Where a protocol stands relative to its next step.
#[derive(Debug, PartialEq, Eq)]
pub enum DueStep {
    /// Every step has been sent.
    Complete,
    NotYetDue {
        template: &'static DripTemplate,
        due_on: NaiveDate,
    },
    Due(&'static DripTemplate),
}

/// Next step after `emails_sent` steps, gated on whole days since `anchor`.
pub fn due_step(emails_sent: u32, anchor: NaiveDate, today: NaiveDate) -> DueStep {
    let Some(template) = usize::try_from(emails_sent).ok().and_then(|i| CATALOG.get(i)) else {
        return DueStep::Complete;
    };
    if days_between(anchor, today) < template.day_offset {
        DueStep::NotYetDue {
            template,
            // Not yet due means the due date lies after today, so saturate.
            due_on: template.due_on(anchor).unwrap_or(NaiveDate::MAX),
        }
    } else {
        DueStep::Due(template)
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DRIP_SEQUENCE_LEN;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn catalog_is_ordered_one_step_per_day() {
        assert_eq!(CATALOG.len(), DRIP_SEQUENCE_LEN as usize);
        for (i, template) in CATALOG.iter().enumerate() {
            assert_eq!(template.step_number as usize, i);
            assert_eq!(template.day_offset, i as i64);
            assert_eq!(template.display_number() as usize, i + 1);
        }
    }

    #[test]
    fn every_template_greets_by_name() {
        for template in &CATALOG {
            let html = template.render("Dana");
            assert!(html.contains("Dana"), "step {} missing name", template.step_number);
            assert!(!html.contains(NAME_PLACEHOLDER));
        }
    }

    #[test]
    fn render_escapes_markup() {
        let html = CATALOG[0].render("<b>Al & Co</b>");
        assert!(html.contains("&lt;b&gt;Al &amp; Co&lt;/b&gt;"));
        assert!(!html.contains("<b>Al"));
    }

    #[test]
    fn due_step_walks_the_catalog() {
        let anchor = date(2026, 5, 1);
        assert_eq!(due_step(0, anchor, anchor), DueStep::Due(&CATALOG[0]));
        assert_eq!(
            due_step(1, anchor, anchor),
            DueStep::NotYetDue { template: &CATALOG[1], due_on: date(2026, 5, 2) }
        );
        assert_eq!(due_step(1, anchor, date(2026, 5, 2)), DueStep::Due(&CATALOG[1]));
        assert_eq!(due_step(3, anchor, date(2026, 5, 30)), DueStep::Due(&CATALOG[3]));
        assert_eq!(due_step(4, anchor, date(2026, 5, 30)), DueStep::Complete);
    }

    #[test]
    fn due_step_at_calendar_end() {
        let anchor = NaiveDate::MAX;
        assert_eq!(due_step(0, anchor, anchor), DueStep::Due(&CATALOG[0]));
        assert_eq!(CATALOG[1].due_on(anchor), None);
        let today = add_days(anchor, -1).unwrap();
        assert_eq!(
            due_step(1, today, today),
            DueStep::NotYetDue { template: &CATALOG[1], due_on: anchor }
        );
        assert_eq!(
            due_step(2, today, today),
            DueStep::NotYetDue { template: &CATALOG[2], due_on: NaiveDate::MAX }
        );
    }

    proptest! {
        #[test]
        fn step_never_due_before_its_offset(
            sent in 0u32..6,
            anchor_offset in 0i64..2000,
            elapsed in -10i64..10,
        ) {
            let anchor = add_days(date(2020, 1, 1), anchor_offset).unwrap();
            let today = add_days(anchor, elapsed).unwrap();
            match due_step(sent, anchor, today) {
                DueStep::Due(template) => {
                    prop_assert!(elapsed >= template.day_offset);
                    prop_assert_eq!(template.step_number as u32, sent);
                }
                DueStep::NotYetDue { template, due_on } => {
                    prop_assert!(elapsed < template.day_offset);
                    prop_assert!(due_on > today);
                }
                DueStep::Complete => prop_assert!(sent >= DRIP_SEQUENCE_LEN as u32),
            }
        }
    }
}
