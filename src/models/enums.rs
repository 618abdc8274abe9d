use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(ProgramCategory {
    WeightLoss => "weight_loss",
    Hrt => "hrt",
    Peptide => "peptide",
    Iv => "iv",
    Hbot => "hbot",
    RedLight => "red_light",
    Injection => "injection",
    Other => "other",
});

str_enum!(DeliveryMethod {
    InClinic => "in_clinic",
    TakeHome => "take_home",
});

str_enum!(ProtocolStatus {
    Active => "active",
    Completed => "completed",
    Paused => "paused",
    Cancelled => "cancelled",
});

str_enum!(LogKind {
    Visit => "visit",
    Injection => "injection",
    DripEmail => "drip_email",
    Missed => "missed",
    Note => "note",
});

impl LogKind {
    /// Kinds that record an attended visit. An injection logged at the
    /// clinic is a visit with dose details attached.
    pub const ATTENDANCE: [LogKind; 2] = [LogKind::Visit, LogKind::Injection];

    pub fn is_attendance(&self) -> bool {
        Self::ATTENDANCE.contains(self)
    }
}
