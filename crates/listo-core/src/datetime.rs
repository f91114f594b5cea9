use anyhow::anyhow;
use chrono::{
  DateTime,
  Local,
  NaiveDate,
  NaiveDateTime,
  Timelike
};

const DUE_MINUTES_FORMAT: &str =
  "%Y-%m-%dT%H:%M";
const DUE_SECONDS_FORMAT: &str =
  "%Y-%m-%dT%H:%M:%S";
const DUE_FRACTION_FORMAT: &str =
  "%Y-%m-%dT%H:%M:%S%.f";

const ACCEPTED_DATETIME_FORMATS: [&str;
  6] = [
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M"
];

/// Parses a due timestamp. Local
/// `datetime-local` style values are
/// taken as-is; values with an offset
/// are converted to local time. An
/// empty input means no due date.
pub fn parse_due(
  raw: &str
) -> anyhow::Result<Option<NaiveDateTime>>
{
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Ok(None);
  }

  for fmt in ACCEPTED_DATETIME_FORMATS {
    if let Ok(parsed) =
      NaiveDateTime::parse_from_str(
        trimmed, fmt
      )
    {
      return Ok(Some(parsed));
    }
  }

  if let Ok(parsed) =
    DateTime::parse_from_rfc3339(trimmed)
  {
    return Ok(Some(
      parsed
        .with_timezone(&Local)
        .naive_local()
    ));
  }

  if let Some(midnight) =
    NaiveDate::parse_from_str(
      trimmed, "%Y-%m-%d"
    )
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
  {
    return Ok(Some(midnight));
  }

  Err(anyhow!(
    "unrecognized due date: {trimmed}"
  ))
}

/// Shortest ISO-8601 form that parses
/// back to the same value.
#[must_use]
pub fn format_due_iso(
  due: &NaiveDateTime
) -> String {
  let fmt = if due.nanosecond() != 0 {
    DUE_FRACTION_FORMAT
  } else if due.second() != 0 {
    DUE_SECONDS_FORMAT
  } else {
    DUE_MINUTES_FORMAT
  };
  due.format(fmt).to_string()
}

/// Human label for a due timestamp:
/// `Today HH:MM` on the same local day
/// as `now`, otherwise the full date.
#[must_use]
pub fn format_due_label(
  due: &NaiveDateTime,
  now: &NaiveDateTime
) -> String {
  let time = due.format("%H:%M");
  if due.date() == now.date() {
    format!("Today {time}")
  } else {
    format!(
      "{} {time}",
      due.format("%Y-%m-%d")
    )
  }
}

pub mod due_serde {
  use chrono::NaiveDateTime;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };
  use tracing::warn;

  pub fn serialize<S>(
    due: &Option<NaiveDateTime>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match due {
      | Some(value) => {
        serializer.serialize_str(
          &super::format_due_iso(value)
        )
      }
      | None => serializer.serialize_none()
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<
    Option<NaiveDateTime>,
    D::Error
  >
  where
    D: Deserializer<'de>
  {
    let raw = Option::<String>::deserialize(
      deserializer
    )?;
    let Some(raw) = raw else {
      return Ok(None);
    };

    match super::parse_due(&raw) {
      | Ok(due) => Ok(due),
      | Err(err) => {
        warn!(raw = %raw, error = %err, "dropping unparsable due date");
        Ok(None)
      }
    }
  }
}
