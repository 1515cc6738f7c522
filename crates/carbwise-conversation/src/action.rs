// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Button payloads understood by the conversation engine.

use std::fmt;
use std::str::FromStr;

use strum::{AsRefStr, EnumString};

/// Actions without arguments. The payload is the snake_case variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Simple {
    MainMenu,
    AnalyzeFood,
    BloodSugar,
    Settings,
    InsulinRatio,
    AddInsulinRatio,
    EditInsulinRatio,
    DeleteInsulinRatio,
    ReplaceAllRatios,
    DeleteAllRatios,
    ClearAndAddRatio,
    ClearRatios,
    ConfirmChanges,
    CancelChanges,
    ActiveInsulinTime,
}

const EDIT_PREFIX: &str = "edit_ratio_";
const DELETE_PREFIX: &str = "delete_ratio_";

/// A parsed callback payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Simple(Simple),
    EditRatio(i64),
    DeleteRatio(i64),
}

impl Action {
    pub const MAIN_MENU: Action = Action::Simple(Simple::MainMenu);
}

impl From<Simple> for Action {
    fn from(simple: Simple) -> Self {
        Action::Simple(simple)
    }
}

impl FromStr for Action {
    type Err = strum::ParseError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let id = |rest: &str| rest.parse::<i64>().map_err(|_| strum::ParseError::VariantNotFound);
        if let Some(rest) = data.strip_prefix(EDIT_PREFIX) {
            return id(rest).map(Action::EditRatio);
        }
        if let Some(rest) = data.strip_prefix(DELETE_PREFIX) {
            return id(rest).map(Action::DeleteRatio);
        }
        Simple::from_str(data).map(Action::Simple)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Simple(simple) => f.write_str(simple.as_ref()),
            Action::EditRatio(id) => write!(f, "{EDIT_PREFIX}{id}"),
            Action::DeleteRatio(id) => write!(f, "{DELETE_PREFIX}{id}"),
        }
    }
}
