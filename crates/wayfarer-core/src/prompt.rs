//! Prompt construction for travel plan generation.
//!
//! Builds the single-turn prompt sent to the model: trip parameters,
//! requirements, and the exact JSON output contract. Pure string logic;
//! the only failure mode is a date that does not parse.

use chrono::NaiveDate;
use thiserror::Error;

use wayfarer_db::models::TravelInput;

/// Errors from building a generation prompt.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("invalid {field} {value:?} (expected YYYY-MM-DD)")]
    BadDate { field: &'static str, value: String },
}

// ---------------------------------------------------------------------------
// Prompt sections
// ---------------------------------------------------------------------------

/// Planning requirements included in every prompt.
const REQUIREMENTS: &str = r#"## Requirements

1. Account for transport from the origin to the destination.
2. Build a timeline for each day, morning through night.
3. Include meals (breakfast, lunch, dinner).
4. Set times with travel durations in mind.
5. Distribute spending so the whole trip stays within the budget.
6. Keep each activity description short.
"#;

/// JSON output contract included in every prompt.
const OUTPUT_CONTRACT: &str = r#"## Output format

Respond with exactly this JSON shape. Return ONLY the JSON.

```json
{
  "schedules": [
    {
      "day": 1,
      "date": "2025-04-01",
      "timeline": [
        {
          "time": "09:00",
          "activity": "Breakfast",
          "location": "Hotel restaurant",
          "cost": 1500,
          "duration": 30,
          "notes": "Buffet style"
        },
        {
          "time": "10:30",
          "activity": "Sightseeing spot",
          "location": "City centre",
          "cost": 1000,
          "duration": 120,
          "notes": "Best visited early"
        }
      ],
      "daily_cost": 3000,
      "daily_duration": 480
    }
  ],
  "total_cost": 100000,
  "total_duration": 1440
}
```
"#;

/// Formatting rules included in every prompt.
const RULES: &str = r#"## Rules

- Times use HH:MM, 24-hour clock.
- `duration` is in minutes.
- Day numbering starts at 1; day 1's `date` is the start date.
- One schedule entry per day, covering the whole trip inclusive of both dates.
- The summed costs must not exceed the budget.
"#;

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Inclusive trip length in days: start and end date both count, so
/// 2025-01-01 through 2025-01-05 is a 5-day trip.
pub fn trip_length_days(input: &TravelInput) -> Result<i64, PromptError> {
    let start = parse_date("start_date", &input.start_date)?;
    let end = parse_date("end_date", &input.end_date)?;
    Ok((end - start).num_days() + 1)
}

fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, PromptError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| PromptError::BadDate {
        field,
        value: value.to_owned(),
    })
}

/// Build the full generation prompt for the given trip parameters.
///
/// All input fields are embedded verbatim; the budget is rendered with
/// thousands separators for readability.
pub fn build_travel_prompt(input: &TravelInput) -> Result<String, PromptError> {
    let days = trip_length_days(input)?;
    let interests = if input.interests.is_empty() {
        "no particular preference".to_owned()
    } else {
        input.interests.join(", ")
    };
    let notes = input.additional_notes.as_deref().unwrap_or("none");

    let mut prompt = String::with_capacity(4096);

    // Role and task.
    prompt.push_str("# Travel Planner\n\n");
    prompt.push_str(
        "You are an AI travel planner. Produce a detailed day-by-day travel \
         plan for the trip described below.\n\n",
    );

    // Trip parameters.
    prompt.push_str("## Trip Parameters\n\n");
    prompt.push_str(&format!("- **Origin:** {}\n", input.origin));
    prompt.push_str(&format!("- **Destination:** {}\n", input.destination));
    prompt.push_str(&format!("- **Start date:** {}\n", input.start_date));
    prompt.push_str(&format!("- **End date:** {}\n", input.end_date));
    prompt.push_str(&format!(
        "- **Trip length:** {days}-day trip, both dates inclusive\n"
    ));
    prompt.push_str(&format!(
        "- **Budget:** {} total\n",
        format_thousands(input.budget)
    ));
    prompt.push_str(&format!("- **Interests:** {interests}\n"));
    prompt.push_str(&format!("- **Additional requests:** {notes}\n\n"));

    prompt.push_str(REQUIREMENTS);
    prompt.push('\n');
    prompt.push_str(OUTPUT_CONTRACT);
    prompt.push('\n');
    prompt.push_str(RULES);
    prompt.push('\n');
    prompt.push_str("Generate the travel plan now.\n");

    Ok(prompt)
}

/// Render an integer with `,` thousands separators: `100000` -> `"100,000"`.
pub fn format_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
