//! 推論動作 (inference action) のエンジン
//!
//! フェーズ内の前方参照はすべて推論動作で表す。動作は前提条件の
//! 集合と 1 回だけ呼ばれるハンドラを持ち、前提が揃った時点で走査
//! ループが実行する。フェーズが静止してもなお前提が揃わない動作は
//! ちょうど 1 回だけ棄却され、未解決の前提の一覧を受け取る。

use std::fmt;

use log::debug;

use crate::error::{ReactorError, SchemaError, SchemaResult};

use super::context::StmtId;
use super::global::BuildGlobalContext;
use super::namespace::{
    NamespaceId, NamespaceKey, NamespaceKeyCriterion, NamespaceValue, NsKey, NsValue,
    ParserNamespace, StorageRef,
};
use super::phase::ModelProcessingPhase;
use super::source::SourceId;

/// ソースごとの動作表への参照。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionRef {
    pub source: SourceId,
    pub index: usize,
}

/// 動作内の 1 前提への参照。リスナ表から逆引きするのに使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrereqRef {
    pub action: ActionRef,
    pub prereq: usize,
}

/// 前提条件の種別。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prerequisite {
    /// 文脈があるフェーズへ到達するのを待つ。
    PhaseReached {
        stmt: StmtId,
        phase: ModelProcessingPhase,
    },
    /// 名前空間にキーが現れるのを待つ。
    NamespaceItem {
        namespace: NamespaceId,
        origin: StorageRef,
        key: NsKey,
    },
    /// 条件に合う最良の候補が現れるのを待つ。
    NamespaceCriterion {
        namespace: NamespaceId,
        origin: StorageRef,
        criterion: NamespaceKeyCriterion,
    },
    /// 変異対象。動作が走るまで対象のフェーズ完了を差し止める。
    Mutation {
        stmt: StmtId,
        phase: ModelProcessingPhase,
    },
}

impl fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PhaseReached { stmt, phase } => {
                write!(f, "statement {stmt:?} reaching {phase}")
            }
            Self::NamespaceItem { namespace, key, .. } => {
                write!(f, "key {key} in namespace {namespace}")
            }
            Self::NamespaceCriterion {
                namespace,
                criterion,
                ..
            } => write!(f, "{criterion} in namespace {namespace}"),
            Self::Mutation { stmt, phase } => write!(f, "mutation of {stmt:?} at {phase}"),
        }
    }
}

/// 解決済み前提が運ぶ値。
#[derive(Debug, Clone, PartialEq)]
pub enum PrereqValue {
    Stmt(StmtId),
    Ns(NsValue),
}

#[derive(Debug)]
pub(super) struct PrereqSlot {
    pub(super) prereq: Prerequisite,
    pub(super) value: Option<PrereqValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ActionState {
    Pending,
    Applied,
    Failed,
}

/// 登録済みの推論動作 1 件分。
#[derive(Debug)]
pub(super) struct InferenceAction {
    pub(super) phase: ModelProcessingPhase,
    pub(super) slots: Vec<PrereqSlot>,
    pub(super) handler: Option<Box<dyn ActionHandler>>,
    pub(super) state: ActionState,
}

impl InferenceAction {
    fn is_runnable(&self) -> bool {
        self.state == ActionState::Pending
            && self.handler.is_some()
            && self.slots.iter().all(|slot| slot.value.is_some())
    }
}

/// ハンドラへ渡される、登録順に並んだ解決済みの前提の値。
#[derive(Debug)]
pub struct ResolvedPrereqs {
    values: Vec<PrereqValue>,
}

impl ResolvedPrereqs {
    /// 文脈を運ぶ前提の値。文脈値を持つ名前空間の値も受け付ける。
    pub fn stmt(&self, index: usize) -> SchemaResult<StmtId> {
        match self.values.get(index) {
            Some(PrereqValue::Stmt(id)) => Ok(*id),
            Some(PrereqValue::Ns(NsValue::Stmt(id))) => Ok(*id),
            other => Err(ReactorError::Internal {
                message: format!("前提 {index} は文脈を運んでいない: {other:?}"),
            }
            .into()),
        }
    }

    pub fn ns_value(&self, index: usize) -> SchemaResult<&NsValue> {
        match self.values.get(index) {
            Some(PrereqValue::Ns(value)) => Ok(value),
            other => Err(ReactorError::Internal {
                message: format!("前提 {index} は名前空間の値を運んでいない: {other:?}"),
            }
            .into()),
        }
    }
}

/// 推論動作の本体。`apply` は前提が揃ったとき、
/// `prerequisite_failed` は静止時にそれぞれ 1 回だけ呼ばれる。
pub trait ActionHandler: fmt::Debug {
    fn apply(
        &mut self,
        rx: &mut BuildGlobalContext,
        resolved: &ResolvedPrereqs,
    ) -> SchemaResult<()>;

    /// 静止時に前提が揃わなかったとき 1 回だけ呼ばれる。通常は
    /// 最初の未解決前提を推論失敗として報告する。「無ければ無視して
    /// よい」動作はここで黙って受け流す。
    fn prerequisite_failed(
        &mut self,
        rx: &mut BuildGlobalContext,
        failed: &[Prerequisite],
    ) -> SchemaResult<()>;
}

/// 動作を組み立てるビルダ。
///
/// 前提をすべて並べてから `apply` でハンドラごと登録する。ビルダは
/// `apply` が消費するので、同じビルダへの二重登録は型の上で起きない。
pub struct ActionBuilder<'a> {
    rx: &'a mut BuildGlobalContext,
    source: SourceId,
    phase: ModelProcessingPhase,
    slots: Vec<PrereqSlot>,
}

impl<'a> ActionBuilder<'a> {
    pub(super) fn new(
        rx: &'a mut BuildGlobalContext,
        source: SourceId,
        phase: ModelProcessingPhase,
    ) -> Self {
        Self {
            rx,
            source,
            phase,
            slots: Vec::new(),
        }
    }

    fn push(&mut self, prereq: Prerequisite) -> usize {
        let index = self.slots.len();
        self.slots.push(PrereqSlot {
            prereq,
            value: None,
        });
        index
    }

    /// 文脈のフェーズ到達を前提にする。返る添字で値を引ける。
    pub fn requires_phase(&mut self, stmt: StmtId, phase: ModelProcessingPhase) -> usize {
        self.push(Prerequisite::PhaseReached { stmt, phase })
    }

    /// 名前空間にキーが現れることを前提にする。
    pub fn requires_ns_item<K: NamespaceKey, V: NamespaceValue>(
        &mut self,
        namespace: ParserNamespace<K, V>,
        origin: StorageRef,
        key: K,
    ) -> usize {
        self.push(Prerequisite::NamespaceItem {
            namespace: namespace.id(),
            origin,
            key: key.into_key(),
        })
    }

    /// 条件選別付きで名前空間の候補を前提にする。
    pub fn requires_ns_criterion<K, V>(
        &mut self,
        namespace: ParserNamespace<K, V>,
        origin: StorageRef,
        criterion: NamespaceKeyCriterion,
    ) -> usize {
        self.push(Prerequisite::NamespaceCriterion {
            namespace: namespace.id(),
            origin,
            criterion,
        })
    }

    /// 対象のフェーズ完了をこの動作の実行まで差し止める。
    pub fn mutates(&mut self, stmt: StmtId, phase: ModelProcessingPhase) -> usize {
        self.push(Prerequisite::Mutation { stmt, phase })
    }

    pub fn apply(self, handler: Box<dyn ActionHandler>) -> SchemaResult<ActionRef> {
        let Self {
            rx,
            source,
            phase,
            slots,
        } = self;
        let index = rx.sources[source.index()].modifiers.len();
        rx.sources[source.index()].modifiers.push(InferenceAction {
            phase,
            slots,
            handler: Some(handler),
            state: ActionState::Pending,
        });
        let action = ActionRef { source, index };
        rx.wire_action(action)?;
        Ok(action)
    }
}

impl BuildGlobalContext {
    /// 新しい推論動作を組み立て始める。
    pub fn new_inference_action(
        &mut self,
        source: SourceId,
        phase: ModelProcessingPhase,
    ) -> ActionBuilder<'_> {
        ActionBuilder::new(self, source, phase)
    }

    /// 登録直後の動作の前提を配線する。既に満たせる前提はその場で
    /// 解決する。
    pub(super) fn wire_action(&mut self, action: ActionRef) -> SchemaResult<()> {
        let count = self.sources[action.source.index()].modifiers[action.index]
            .slots
            .len();
        for index in 0..count {
            let target = PrereqRef {
                action,
                prereq: index,
            };
            let prereq = self.sources[action.source.index()].modifiers[action.index].slots[index]
                .prereq
                .clone();
            match prereq {
                Prerequisite::PhaseReached { stmt, phase } => {
                    if self.tree.add_phase_listener(stmt, phase, target) {
                        self.resolve_prereq(target, PrereqValue::Stmt(stmt));
                    }
                }
                Prerequisite::Mutation { stmt, phase } => {
                    self.tree.open_mutation(stmt, phase);
                    self.resolve_prereq(target, PrereqValue::Stmt(stmt));
                }
                Prerequisite::NamespaceItem {
                    namespace,
                    origin,
                    key,
                } => match self.read_ns_entry(origin, namespace, &key)? {
                    Some(value) => self.resolve_prereq(target, PrereqValue::Ns(value)),
                    None => self.listeners.await_key(namespace, origin, key, target),
                },
                Prerequisite::NamespaceCriterion {
                    namespace,
                    origin,
                    criterion,
                } => {
                    let mut best: Option<(NsKey, NsValue)> = None;
                    for (key, value) in self.ns_entries_visible(origin, namespace)? {
                        if !criterion.matches(&key) {
                            continue;
                        }
                        match &best {
                            Some((current, _)) if !criterion.prefers(&key, current) => {}
                            _ => best = Some((key, value)),
                        }
                    }
                    match best {
                        Some((_, value)) => self.resolve_prereq(target, PrereqValue::Ns(value)),
                        None => self.listeners.await_criterion(namespace, origin, criterion, target),
                    }
                }
            }
        }
        Ok(())
    }

    /// 前提を解決済みにする。
    pub(super) fn resolve_prereq(&mut self, target: PrereqRef, value: PrereqValue) {
        let slot = &mut self.sources[target.action.source.index()].modifiers[target.action.index]
            .slots[target.prereq];
        if slot.value.is_none() {
            slot.value = Some(value);
        }
    }

    /// フェーズ完了で発火したリスナを、待っていた文脈の値で解決する。
    pub(super) fn resolve_phase_listeners(&mut self, fired: Vec<PrereqRef>) {
        for target in fired {
            let slot = &self.sources[target.action.source.index()].modifiers
                [target.action.index]
                .slots[target.prereq];
            if let Prerequisite::PhaseReached { stmt, .. } = slot.prereq {
                self.resolve_prereq(target, PrereqValue::Stmt(stmt));
            }
        }
    }

    /// 走れる動作が無くなるまで全ソースの動作を走査する。
    /// 1 件でも実行したら真を返す。
    pub(super) fn run_pending_actions(&mut self) -> bool {
        let mut progressed = false;
        loop {
            let mut ran_any = false;
            for source_index in 0..self.sources.len() {
                let mut action_index = 0;
                while action_index < self.sources[source_index].modifiers.len() {
                    if self.sources[source_index].modifiers[action_index].is_runnable() {
                        ran_any = true;
                        progressed = true;
                        if let Err(error) = self.run_action(source_index, action_index) {
                            self.record_source_failure(SourceId(source_index as u32), error);
                        }
                    }
                    action_index += 1;
                }
            }
            if !ran_any {
                break;
            }
        }
        progressed
    }

    fn run_action(&mut self, source_index: usize, action_index: usize) -> SchemaResult<()> {
        let (mut handler, resolved, mutations) = {
            let action = &mut self.sources[source_index].modifiers[action_index];
            action.state = ActionState::Applied;
            let handler = action.handler.take().ok_or_else(|| ReactorError::Internal {
                message: "適用済みの動作をもう一度実行しようとした".into(),
            })?;
            let mut values = Vec::with_capacity(action.slots.len());
            let mut mutations = Vec::new();
            for slot in &action.slots {
                match &slot.value {
                    Some(value) => values.push(value.clone()),
                    None => {
                        return Err(ReactorError::Internal {
                            message: "未解決の前提を持つ動作が実行された".into(),
                        }
                        .into())
                    }
                }
                if let Prerequisite::Mutation { stmt, phase } = slot.prereq {
                    mutations.push((stmt, phase));
                }
            }
            (handler, ResolvedPrereqs { values }, mutations)
        };
        let result = handler.apply(self, &resolved);
        for (stmt, phase) in mutations {
            self.tree.close_mutation(stmt, phase)?;
        }
        result
    }

    /// 現在フェーズで未解決のまま残った動作をちょうど 1 回ずつ
    /// 棄却する。差し止めていた変異も解き、フェーズを前へ進める。
    pub(super) fn fail_source_modifiers(&mut self, source_index: usize) {
        let phase = self.current_phase;
        let count = self.sources[source_index].modifiers.len();
        for action_index in 0..count {
            let (handler, failed, mutations) = {
                let action = &mut self.sources[source_index].modifiers[action_index];
                if action.state != ActionState::Pending || action.phase != phase {
                    continue;
                }
                action.state = ActionState::Failed;
                let failed: Vec<Prerequisite> = action
                    .slots
                    .iter()
                    .filter(|slot| slot.value.is_none())
                    .map(|slot| slot.prereq.clone())
                    .collect();
                let mutations: Vec<(StmtId, ModelProcessingPhase)> = action
                    .slots
                    .iter()
                    .filter_map(|slot| match slot.prereq {
                        Prerequisite::Mutation { stmt, phase } => Some((stmt, phase)),
                        _ => None,
                    })
                    .collect();
                (action.handler.take(), failed, mutations)
            };
            debug!(
                "フェーズ {phase} の静止時に動作 {source_index}/{action_index} を棄却する ({} 件未解決)",
                failed.len()
            );
            if let Some(mut handler) = handler {
                if let Err(error) = handler.prerequisite_failed(self, &failed) {
                    self.record_source_failure(SourceId(source_index as u32), error);
                }
            }
            for (stmt, mutation_phase) in mutations {
                if let Err(error) = self.tree.close_mutation(stmt, mutation_phase) {
                    self.record_source_failure(SourceId(source_index as u32), error);
                }
            }
        }
    }

    /// 指定フェーズの未処理動作が残っているか。
    pub(super) fn has_pending_modifiers(&self, source_index: usize, phase: ModelProcessingPhase) -> bool {
        self.sources[source_index]
            .modifiers
            .iter()
            .any(|action| action.state == ActionState::Pending && action.phase == phase)
    }
}

/// 棄却時に最初の未解決前提から推論失敗を作る補助。
pub fn inference_failure(failed: &[Prerequisite], message: &str, at: crate::model::SourceRef) -> SchemaError {
    let detail = failed
        .iter()
        .map(|prereq| prereq.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    crate::error::SourceError::InferenceFailed {
        message: if detail.is_empty() {
            message.to_owned()
        } else {
            format!("{message} (未解決: {detail})")
        },
        at,
    }
    .into()
}
