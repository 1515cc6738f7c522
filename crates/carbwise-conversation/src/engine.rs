// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user dialog driven by chat events.
//!
//! Every inbound event is one turn: resolve the user, read their state,
//! act, reply, and store the next state. Turns never share mutable data
//! except through the [`StateStore`], which is keyed by the chat user.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use strum::AsRefStr;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use carbwise_analysis::AnalysisOrchestrator;
use carbwise_core::clock::{parse_decimal, parse_duration};
use carbwise_core::types::{
    ChatId, ConversationState, InboundMessage, Menu, MessageContent, MessageId, NewCorrection,
    NewFoodAnalysis, OutboundMessage, RichText, User,
};
use carbwise_core::vision::{ImageInput, NO_FOOD_MESSAGE};
use carbwise_core::{
    CarbwiseError, ChannelAdapter, ErrorCategory, StateStore, StorageAdapter, TimePeriod,
    ValidationError,
};
use carbwise_dosing::DoseCalculator;
use carbwise_ratio::algebra::validate_ratio;
use carbwise_ratio::{Changeset, DeletePlan, PendingUpdate, RatioIntervalStore, UpdateOutcome};

use crate::action::{Action, Simple};
use crate::{menus, render};

/// How many blood sugar readings `/history` shows.
const HISTORY_LIMIT: usize = 10;

/// Pause after a failed receive before polling the channel again.
const RECEIVE_BACKOFF: Duration = Duration::from_secs(1);

/// Keys of the per-user temporary data bag.
#[derive(Debug, Clone, Copy, AsRefStr)]
#[strum(serialize_all = "snake_case")]
enum TempKey {
    /// The period entered in the current add or edit flow.
    Period,
    /// Id of the period being edited.
    EditTarget,
    /// Overlap changes the user is asked to accept.
    Changeset,
    /// A delete waiting for confirmation.
    DeletePlan,
}

/// Who a turn is for and where replies go.
struct Turn {
    user: User,
    chat: ChatId,
}

/// The conversation state machine.
pub struct ConversationEngine {
    storage: Arc<dyn StorageAdapter>,
    state: Arc<dyn StateStore>,
    ratios: RatioIntervalStore,
    dosing: DoseCalculator,
    analysis: Arc<AnalysisOrchestrator>,
    channel: Arc<dyn ChannelAdapter>,
    cancel: CancellationToken,
}

impl ConversationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        state: Arc<dyn StateStore>,
        ratios: RatioIntervalStore,
        dosing: DoseCalculator,
        analysis: Arc<AnalysisOrchestrator>,
        channel: Arc<dyn ChannelAdapter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            storage,
            state,
            ratios,
            dosing,
            analysis,
            channel,
            cancel,
        }
    }

    /// Receives events until cancelled, handling each on its own task.
    ///
    /// On cancellation the receive loop stops and in-flight turns get
    /// `drain_timeout` to finish before they are aborted.
    pub async fn run(self: Arc<Self>, drain_timeout: Duration) -> Result<(), CarbwiseError> {
        info!(channel = self.channel.name(), "conversation loop running");
        let mut turns = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("shutdown signal received, stopping conversation loop");
                    break;
                }
                received = self.channel.receive() => match received {
                    Ok(inbound) => {
                        let engine = Arc::clone(&self);
                        turns.spawn(async move { engine.handle(inbound).await });
                    }
                    Err(e) => {
                        error!(error = %e, "channel receive error");
                        tokio::select! {
                            _ = self.cancel.cancelled() => break,
                            _ = tokio::time::sleep(RECEIVE_BACKOFF) => {}
                        }
                    }
                },
                Some(joined) = turns.join_next(), if !turns.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "conversation turn panicked");
                    }
                }
            }
        }

        crate::shutdown::drain_turns(&mut turns, drain_timeout).await;
        info!("conversation loop stopped");
        Ok(())
    }

    /// Handles one inbound event. Failures are reported to the user and
    /// logged; nothing propagates.
    pub async fn handle(&self, inbound: InboundMessage) {
        let op = operation(&inbound.content);
        let user = match self
            .storage
            .get_or_create_user(inbound.sender, &inbound.profile)
            .await
        {
            Ok(user) => user,
            Err(e) => {
                error!(op = %op, external_id = inbound.sender.0, error = %e, "failed to resolve user");
                self.send(OutboundMessage::text(inbound.chat_id, menus::SAVE_FAILED))
                    .await;
                return;
            }
        };
        let turn = Turn {
            user,
            chat: inbound.chat_id,
        };
        debug!(op = %op, user_id = turn.user.id.0, "turn started");

        if let Err(e) = self.dispatch(&turn, inbound.content).await {
            self.report(&turn, &op, e).await;
        }
    }

    async fn dispatch(&self, turn: &Turn, content: MessageContent) -> Result<(), CarbwiseError> {
        match content {
            MessageContent::Command { name, args } => self.on_command(turn, &name, &args).await,
            MessageContent::Callback { data } => match data.parse::<Action>() {
                Ok(action) => self.on_action(turn, action).await,
                Err(_) => {
                    debug!(data, "unknown callback payload");
                    self.say(turn, menus::USE_MENU).await;
                    Ok(())
                }
            },
            MessageContent::Text(text) => self.on_text(turn, &text).await,
            MessageContent::Photo {
                data,
                caption,
                file_ref,
            } => self.on_photo(turn, data, caption, file_ref).await,
        }
    }

    /// Surfaces a failed turn according to its error category.
    async fn report(&self, turn: &Turn, op: &str, err: CarbwiseError) {
        let user_id = turn.user.id.0;
        match err {
            CarbwiseError::Cancelled => {
                debug!(op, user_id, "turn cancelled by shutdown");
            }
            CarbwiseError::Validation(ValidationError::StaleChangeset) => {
                info!(op, user_id, "confirmed ratio changes went stale");
                self.abandon_ratio_flow(turn, ValidationError::StaleChangeset)
                    .await;
            }
            CarbwiseError::Validation(v) => {
                debug!(op, user_id, error = %v, "input rejected");
                self.say(turn, render::validation(&v)).await;
            }
            CarbwiseError::NotFound {
                entity: "ratio_period",
                ref id,
            } => {
                info!(op, user_id, period_id = %id, "ratio period no longer exists");
                self.end_flow_quietly(turn).await;
                self.say(turn, menus::RATIO_NOT_FOUND).await;
            }
            err => match err.category() {
                ErrorCategory::ExternalProvider => {
                    warn!(op, user_id, error = %err, "analysis failed");
                    if let Err(e) = self.state.reset(turn.user.external_id).await {
                        warn!(user_id, error = %e, "failed to reset conversation state");
                    }
                    self.say(turn, menus::ANALYSIS_FAILED).await;
                }
                ErrorCategory::Persistence => {
                    error!(op, user_id, error = %err, "persistence failure");
                    self.say(turn, menus::SAVE_FAILED).await;
                }
                ErrorCategory::Validation | ErrorCategory::Internal => {
                    error!(op, user_id, error = %err, "turn failed");
                    self.say(turn, menus::INTERNAL_FAILURE).await;
                }
            },
        }
    }

    // --- Commands ---

    async fn on_command(&self, turn: &Turn, name: &str, args: &str) -> Result<(), CarbwiseError> {
        let name = name.trim_start_matches('/');
        let name = name.split('@').next().unwrap_or(name);
        match name {
            "start" => {
                self.state.reset(turn.user.external_id).await?;
                self.show_main(turn).await;
            }
            "help" => self.say(turn, menus::HELP_TEXT).await,
            "history" => {
                let records = self
                    .storage
                    .list_blood_sugar_records(turn.user.id, HISTORY_LIMIT)
                    .await?;
                let text = render::blood_sugar_history(&records, &self.dosing.clock());
                self.say(turn, text).await;
            }
            "correct" => self.correct_latest(turn, args).await?,
            other => {
                debug!(command = other, "unknown command");
                self.say(turn, menus::UNKNOWN_COMMAND).await;
            }
        }
        Ok(())
    }

    /// `/correct <carbs> [weight]` against the newest analysis.
    async fn correct_latest(&self, turn: &Turn, args: &str) -> Result<(), CarbwiseError> {
        let mut parts = args.split_whitespace();
        let carbs = parts
            .next()
            .and_then(|p| parse_decimal(p).ok())
            .filter(|c| *c >= 0.0);
        let weight = match parts.next() {
            None => Ok(None),
            Some(w) => match parse_decimal(w) {
                Ok(w) if w > 0.0 => Ok(Some(w)),
                _ => Err(()),
            },
        };
        let (Some(carbs), Ok(weight)) = (carbs, weight) else {
            self.say(turn, menus::CORRECT_USAGE).await;
            return Ok(());
        };

        let latest = self.storage.list_food_analyses(turn.user.id, 1).await?;
        let Some(latest) = latest.into_iter().next() else {
            self.say(turn, menus::NOTHING_TO_CORRECT).await;
            return Ok(());
        };

        self.storage
            .create_correction(&NewCorrection {
                analysis_id: latest.id,
                user_id: turn.user.id,
                original_carbs: latest.carbs_grams,
                corrected_carbs: carbs,
                original_weight: latest.resolved_weight_grams,
                corrected_weight: weight,
            })
            .await?;
        info!(
            user_id = turn.user.id.0,
            analysis_id = latest.id,
            original = latest.carbs_grams,
            corrected = carbs,
            "analysis corrected"
        );
        self.say(turn, render::correction_saved(latest.carbs_grams, carbs))
            .await;
        Ok(())
    }

    // --- Buttons ---

    async fn on_action(&self, turn: &Turn, action: Action) -> Result<(), CarbwiseError> {
        let user = turn.user.external_id;
        let user_id = turn.user.id;
        match action {
            Action::Simple(Simple::MainMenu) => {
                self.state.reset(user).await?;
                self.show_main(turn).await;
            }
            Action::Simple(Simple::AnalyzeFood) => {
                self.state.clear_temp(user).await?;
                self.state.clear_weight(user).await?;
                self.state
                    .set_state(user, ConversationState::AnalysisArmed)
                    .await?;
                self.say_with(turn, menus::ANALYZE_PROMPT, menus::back_to_main())
                    .await;
            }
            Action::Simple(Simple::BloodSugar) => {
                self.state.clear_temp(user).await?;
                self.state
                    .set_state(user, ConversationState::AwaitingBloodSugarValue)
                    .await?;
                self.say_with(turn, menus::BLOOD_SUGAR_PROMPT, menus::back_to_main())
                    .await;
            }
            Action::Simple(Simple::Settings) => {
                self.end_flow(turn).await?;
                self.say_with(turn, menus::SETTINGS_TEXT, menus::settings_menu())
                    .await;
            }
            Action::Simple(Simple::InsulinRatio | Simple::CancelChanges) => {
                self.end_flow(turn).await?;
                self.show_ratios(turn).await?;
            }
            Action::Simple(Simple::AddInsulinRatio) => self.start_add(turn).await?,
            Action::Simple(Simple::EditInsulinRatio) => {
                let schedule = self.ratios.list(user_id).await?;
                if schedule.periods.is_empty() {
                    self.say_with(turn, menus::NO_RATIOS_TO_EDIT, menus::ratio_menu(false))
                        .await;
                } else {
                    let menu = menus::period_picker(
                        &schedule.periods,
                        "✏️",
                        Action::EditRatio,
                        ("🔄 Заменить все", Simple::ReplaceAllRatios),
                    );
                    self.say_with(turn, "Выберите период для изменения:", menu)
                        .await;
                }
            }
            Action::Simple(Simple::DeleteInsulinRatio) => {
                let schedule = self.ratios.list(user_id).await?;
                if schedule.periods.is_empty() {
                    self.say_with(turn, menus::NO_RATIOS_TO_DELETE, menus::ratio_menu(false))
                        .await;
                } else {
                    let menu = menus::period_picker(
                        &schedule.periods,
                        "🗑️",
                        Action::DeleteRatio,
                        ("🗑️ Удалить все", Simple::DeleteAllRatios),
                    );
                    self.say_with(turn, "Выберите период для удаления:", menu)
                        .await;
                }
            }
            Action::Simple(Simple::ReplaceAllRatios) => {
                let schedule = self.ratios.list(user_id).await?;
                if schedule.periods.is_empty() {
                    self.start_add(turn).await?;
                } else {
                    self.say_with(
                        turn,
                        render::clear_warning(&schedule.periods, true),
                        menus::confirm_clear(Simple::ClearAndAddRatio),
                    )
                    .await;
                }
            }
            Action::Simple(Simple::DeleteAllRatios) => {
                let schedule = self.ratios.list(user_id).await?;
                if schedule.periods.is_empty() {
                    self.say_with(turn, menus::NO_RATIOS_TO_DELETE, menus::ratio_menu(false))
                        .await;
                } else {
                    self.say_with(
                        turn,
                        render::clear_warning(&schedule.periods, false),
                        menus::confirm_clear(Simple::ClearRatios),
                    )
                    .await;
                }
            }
            Action::Simple(Simple::ClearAndAddRatio) => {
                self.ratios.clear(user_id).await?;
                self.start_add(turn).await?;
            }
            Action::Simple(Simple::ClearRatios) => {
                self.ratios.clear(user_id).await?;
                self.end_flow(turn).await?;
                self.say(turn, menus::RATIOS_CLEARED).await;
                self.show_ratios(turn).await?;
            }
            Action::Simple(Simple::ConfirmChanges) => self.confirm_changes(turn).await?,
            Action::Simple(Simple::ActiveInsulinTime) => {
                self.state.clear_temp(user).await?;
                self.state
                    .set_state(user, ConversationState::AwaitingActiveInsulinDuration)
                    .await?;
                self.say_with(
                    turn,
                    render::duration_prompt(turn.user.active_insulin_minutes),
                    menus::back_to_settings(),
                )
                .await;
            }
            Action::EditRatio(id) => {
                let period = self.ratios.get(user_id, id).await?;
                self.state.clear_temp(user).await?;
                self.set_temp(turn, TempKey::EditTarget, id.to_string())
                    .await?;
                self.state
                    .set_state(user, ConversationState::AwaitingTimePeriod)
                    .await?;
                self.say_with(turn, render::edit_prompt(&period), menus::cancel_to_ratios())
                    .await;
            }
            Action::DeleteRatio(id) => {
                let plan = self.ratios.plan_delete(user_id, id).await?;
                self.state.clear_temp(user).await?;
                self.set_temp_json(turn, TempKey::DeletePlan, &plan).await?;
                self.state
                    .set_state(user, ConversationState::AwaitingChangeConfirmation)
                    .await?;
                self.say_with(turn, render::delete_preview(&plan), menus::confirm_changes())
                    .await;
            }
        }
        Ok(())
    }

    async fn start_add(&self, turn: &Turn) -> Result<(), CarbwiseError> {
        self.state.clear_temp(turn.user.external_id).await?;
        self.state
            .set_state(turn.user.external_id, ConversationState::AwaitingTimePeriod)
            .await?;
        self.say_with(turn, menus::PERIOD_PROMPT, menus::cancel_to_ratios())
            .await;
        Ok(())
    }

    /// "Yes" on a pending delete or edit changeset.
    async fn confirm_changes(&self, turn: &Turn) -> Result<(), CarbwiseError> {
        let state = self.state.get_state(turn.user.external_id).await?;
        if state != ConversationState::AwaitingChangeConfirmation {
            debug!(user_id = turn.user.id.0, %state, "confirmation outside a pending change");
            self.say(turn, menus::USE_MENU).await;
            return Ok(());
        }

        if let Some(plan) = self
            .temp_json::<DeletePlan>(turn, TempKey::DeletePlan)
            .await?
        {
            self.ratios.apply_delete(turn.user.id, &plan).await?;
            self.end_flow(turn).await?;
            self.say(turn, menus::RATIO_DELETED).await;
            return self.show_ratios(turn).await;
        }

        if self.temp(turn, TempKey::Changeset).await?.is_some() {
            self.state
                .set_state(turn.user.external_id, ConversationState::AwaitingRatioValue)
                .await?;
            self.say_with(turn, menus::RATIO_PROMPT, menus::cancel_to_ratios())
                .await;
            return Ok(());
        }

        self.end_flow(turn).await?;
        self.say(turn, menus::USE_MENU).await;
        Ok(())
    }

    // --- Free text ---

    async fn on_text(&self, turn: &Turn, text: &str) -> Result<(), CarbwiseError> {
        let user = turn.user.external_id;
        match self.state.get_state(user).await? {
            ConversationState::Idle => self.say(turn, menus::USE_MENU).await,
            ConversationState::AnalysisArmed => match parse_decimal(text) {
                Ok(grams) if grams > 0.0 => {
                    self.state.set_weight(user, grams).await?;
                    self.say(turn, render::weight_saved(grams)).await;
                }
                Ok(_) => return Err(ValidationError::InvalidWeight.into()),
                Err(_) => self.say(turn, menus::ARMED_HINT).await,
            },
            ConversationState::AwaitingBloodSugarValue => {
                let value = parse_decimal(text)
                    .ok()
                    .filter(|v| *v > 0.0)
                    .ok_or(ValidationError::NonPositiveBloodSugar)?;
                self.storage
                    .create_blood_sugar_record(turn.user.id, value)
                    .await?;
                info!(user_id = turn.user.id.0, value, "blood sugar recorded");
                self.end_flow(turn).await?;
                self.say_with(turn, render::blood_sugar_saved(value), menus::main_menu())
                    .await;
            }
            ConversationState::AwaitingTimePeriod => self.on_period(turn, text).await?,
            ConversationState::AwaitingRatioValue => self.on_ratio(turn, text).await?,
            ConversationState::AwaitingActiveInsulinDuration => {
                let minutes = parse_duration(text)?;
                self.storage
                    .set_active_insulin_duration(turn.user.id, minutes)
                    .await?;
                info!(user_id = turn.user.id.0, minutes, "active insulin duration set");
                self.end_flow(turn).await?;
                self.say_with(turn, render::duration_saved(minutes), menus::settings_menu())
                    .await;
            }
            ConversationState::AwaitingChangeConfirmation => {
                self.say(turn, menus::CONFIRM_PROMPT).await;
            }
        }
        Ok(())
    }

    /// Period step of the add and edit flows.
    async fn on_period(&self, turn: &Turn, text: &str) -> Result<(), CarbwiseError> {
        let period = TimePeriod::parse(text)?;
        let user = turn.user.external_id;

        match self.edit_target(turn).await? {
            Some(id) => {
                let changeset = self.ratios.plan_update(turn.user.id, id, &period).await?;
                self.set_temp(turn, TempKey::Period, period.to_string())
                    .await?;
                if changeset.is_empty() {
                    self.state
                        .set_state(user, ConversationState::AwaitingRatioValue)
                        .await?;
                    self.say_with(turn, menus::RATIO_PROMPT, menus::cancel_to_ratios())
                        .await;
                } else {
                    self.set_temp_json(turn, TempKey::Changeset, &changeset)
                        .await?;
                    self.state
                        .set_state(user, ConversationState::AwaitingChangeConfirmation)
                        .await?;
                    self.say_with(turn, render::changeset(&changeset), menus::confirm_changes())
                        .await;
                }
            }
            None => {
                self.ratios
                    .check_available(turn.user.id, &period, None)
                    .await?;
                self.set_temp(turn, TempKey::Period, period.to_string())
                    .await?;
                self.state
                    .set_state(user, ConversationState::AwaitingRatioValue)
                    .await?;
                self.say_with(turn, menus::RATIO_PROMPT, menus::cancel_to_ratios())
                    .await;
            }
        }
        Ok(())
    }

    /// Ratio step: validates the number, then commits the add or edit.
    async fn on_ratio(&self, turn: &Turn, text: &str) -> Result<(), CarbwiseError> {
        let ratio = validate_ratio(parse_decimal(text)?)?;

        let period = match self.temp(turn, TempKey::Period).await? {
            Some(stored) => TimePeriod::parse(&stored)?,
            None => {
                warn!(user_id = turn.user.id.0, "ratio entered without a stored period");
                self.end_flow(turn).await?;
                self.say(turn, menus::USE_MENU).await;
                return Ok(());
            }
        };

        match self.commit_ratio(turn, period, ratio).await {
            Ok(message) => {
                self.end_flow(turn).await?;
                self.say(turn, message).await;
                self.show_ratios(turn).await
            }
            Err(CarbwiseError::Validation(v)) => {
                self.abandon_ratio_flow(turn, v).await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn commit_ratio(
        &self,
        turn: &Turn,
        period: TimePeriod,
        ratio: f64,
    ) -> Result<String, CarbwiseError> {
        let user_id = turn.user.id;
        let Some(id) = self.edit_target(turn).await? else {
            let created = self.ratios.add(user_id, period, ratio).await?;
            return Ok(render::ratio_saved(&created.period, created.ratio));
        };

        let updated = match self.temp_json::<Changeset>(turn, TempKey::Changeset).await? {
            Some(changeset) => {
                let pending = PendingUpdate {
                    target_id: id,
                    period,
                    ratio,
                    changeset,
                };
                self.ratios.apply_update(user_id, &pending).await?
            }
            None => match self.ratios.update(user_id, id, period, ratio).await? {
                UpdateOutcome::Applied(updated) => updated,
                // Another period moved into the range since the period step.
                UpdateOutcome::NeedsConfirmation(_) => {
                    return Err(ValidationError::StaleChangeset.into());
                }
            },
        };
        Ok(render::ratio_updated(&updated.period, updated.ratio))
    }

    /// Ends a ratio flow that can no longer commit and shows why.
    async fn abandon_ratio_flow(&self, turn: &Turn, reason: ValidationError) {
        self.end_flow_quietly(turn).await;
        self.say(turn, render::validation(&reason)).await;
        if let Err(e) = self.show_ratios(turn).await {
            warn!(user_id = turn.user.id.0, error = %e, "failed to show ratio menu");
        }
    }

    // --- Photos ---

    async fn on_photo(
        &self,
        turn: &Turn,
        data: Vec<u8>,
        caption: Option<String>,
        file_ref: Option<String>,
    ) -> Result<(), CarbwiseError> {
        let user = turn.user.external_id;
        if self.state.get_state(user).await? != ConversationState::AnalysisArmed {
            self.say(turn, menus::PRESS_ANALYZE_FIRST).await;
            return Ok(());
        }

        let caption_weight = match caption.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            None => None,
            Some(text) => match parse_decimal(text) {
                Ok(grams) if grams > 0.0 => Some(grams),
                _ => return Err(ValidationError::InvalidWeight.into()),
            },
        };
        let declared = self.state.get_weight(user).await?.or(caption_weight);
        if declared.is_none() {
            self.say(turn, menus::NO_WEIGHT).await;
        }

        let image = ImageInput::new(data);
        let progress = self
            .send(OutboundMessage::text(turn.chat, menus::ANALYZING))
            .await;
        let result = self
            .analysis
            .analyze_food(&image, declared, &self.cancel)
            .await;
        if let Some(id) = progress
            && let Err(e) = self.channel.delete_message(turn.chat, &id).await
        {
            debug!(error = %e, "failed to delete progress message");
        }
        let analysis = result?;
        self.state.reset(user).await?;

        if analysis.no_food {
            info!(user_id = turn.user.id.0, provider = %analysis.provider, "no food on photo");
            // Stored so that `/correct` can target a wrong no-food verdict.
            self.store_analysis(NewFoodAnalysis {
                user_id: turn.user.id,
                image_ref: file_ref,
                declared_weight_grams: declared,
                resolved_weight_grams: None,
                food_items: Vec::new(),
                carbs_grams: 0.0,
                bread_units: 0.0,
                confidence: analysis.confidence,
                rationale: analysis.rationale,
                provider: analysis.provider,
                ratio: None,
                dose_units: 0.0,
            })
            .await?;
            self.say_with(turn, NO_FOOD_MESSAGE, menus::after_analysis())
                .await;
            return Ok(());
        }

        let dose = self
            .dosing
            .recommend(turn.user.id, analysis.carbs_grams, analysis.confidence)
            .await?;

        let caption = render::analysis_caption(&analysis, &dose);
        self.send(
            OutboundMessage::photo(turn.chat, image.data, caption).with_menu(menus::after_analysis()),
        )
        .await;

        self.store_analysis(NewFoodAnalysis {
            user_id: turn.user.id,
            image_ref: file_ref,
            declared_weight_grams: declared,
            resolved_weight_grams: analysis.resolved_weight_grams,
            food_items: analysis.food_items,
            carbs_grams: analysis.carbs_grams,
            bread_units: dose.bread_units,
            confidence: analysis.confidence,
            rationale: analysis.rationale,
            provider: analysis.provider,
            ratio: dose.ratio(),
            dose_units: dose.dose_units,
        })
        .await
    }

    async fn store_analysis(&self, analysis: NewFoodAnalysis) -> Result<(), CarbwiseError> {
        let record = self.storage.create_food_analysis(&analysis).await?;
        info!(
            user_id = record.user_id.0,
            analysis_id = record.id,
            provider = %record.provider,
            carbs = record.carbs_grams,
            dose = record.dose_units,
            "food analysis stored"
        );
        Ok(())
    }

    // --- Helpers ---

    async fn show_main(&self, turn: &Turn) {
        self.say_with(turn, render::main_menu(), menus::main_menu())
            .await;
    }

    async fn show_ratios(&self, turn: &Turn) -> Result<(), CarbwiseError> {
        let schedule = self.ratios.list(turn.user.id).await?;
        let menu = menus::ratio_menu(!schedule.periods.is_empty());
        self.say_with(turn, render::schedule(&schedule), menu).await;
        Ok(())
    }

    /// Back to `Idle` with an empty temp bag. The pending weight is kept.
    async fn end_flow(&self, turn: &Turn) -> Result<(), CarbwiseError> {
        self.state.clear_temp(turn.user.external_id).await?;
        self.state
            .set_state(turn.user.external_id, ConversationState::Idle)
            .await
    }

    async fn end_flow_quietly(&self, turn: &Turn) {
        if let Err(e) = self.end_flow(turn).await {
            warn!(user_id = turn.user.id.0, error = %e, "failed to end conversation flow");
        }
    }

    async fn edit_target(&self, turn: &Turn) -> Result<Option<i64>, CarbwiseError> {
        Ok(self
            .temp(turn, TempKey::EditTarget)
            .await?
            .and_then(|raw| raw.parse().ok()))
    }

    async fn temp(&self, turn: &Turn, key: TempKey) -> Result<Option<String>, CarbwiseError> {
        self.state
            .get_temp(turn.user.external_id, key.as_ref())
            .await
    }

    async fn set_temp(&self, turn: &Turn, key: TempKey, value: String) -> Result<(), CarbwiseError> {
        self.state
            .set_temp(turn.user.external_id, key.as_ref(), value)
            .await
    }

    async fn temp_json<T: DeserializeOwned>(
        &self,
        turn: &Turn,
        key: TempKey,
    ) -> Result<Option<T>, CarbwiseError> {
        self.temp(turn, key)
            .await?
            .map(|raw| {
                serde_json::from_str(&raw).map_err(|e| {
                    CarbwiseError::Internal(format!("corrupt {} in conversation state: {e}", key.as_ref()))
                })
            })
            .transpose()
    }

    async fn set_temp_json<T: Serialize>(
        &self,
        turn: &Turn,
        key: TempKey,
        value: &T,
    ) -> Result<(), CarbwiseError> {
        let raw = serde_json::to_string(value).map_err(|e| {
            CarbwiseError::Internal(format!("failed to encode {}: {e}", key.as_ref()))
        })?;
        self.set_temp(turn, key, raw).await
    }

    async fn say(&self, turn: &Turn, text: impl Into<RichText>) {
        self.send(OutboundMessage::text(turn.chat, text)).await;
    }

    async fn say_with(&self, turn: &Turn, text: impl Into<RichText>, menu: Menu) {
        self.send(OutboundMessage::text(turn.chat, text).with_menu(menu))
            .await;
    }

    /// Delivery failures are logged, never fatal to the turn.
    async fn send(&self, msg: OutboundMessage) -> Option<MessageId> {
        let chat_id = msg.chat_id.0;
        match self.channel.send(msg).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(chat_id, error = %e, "failed to deliver message");
                None
            }
        }
    }
}

/// Short label of an event for logs.
fn operation(content: &MessageContent) -> String {
    match content {
        MessageContent::Command { name, .. } => format!("command:{name}"),
        MessageContent::Callback { data } => format!("callback:{data}"),
        MessageContent::Text(_) => "text".to_string(),
        MessageContent::Photo { .. } => "photo".to_string(),
    }
}
