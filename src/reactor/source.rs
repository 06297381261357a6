//! ソースごとの処理状態
//!
//! 1 つの入力がリアクタ内で持つ状態 (ルート文脈、ソース局所の
//! 名前空間、推論動作、失敗の記録) と、ソースがフェーズごとに文
//! イベントを流し込むための書き込みプロトコルを定める。イベントは
//! 出現位置で既存の文脈に再開され、同じ文を二度作ることはない。

use std::fmt;

use log::trace;

use crate::error::{ReactorError, SchemaError, SchemaResult, SourceError};
use crate::model::{Keyword, QualifiedName, SourceKey, SourceRef, Span, Unqualified};

use super::action::InferenceAction;
use super::context::{StatementNode, StmtId, StmtShape};
use super::global::BuildGlobalContext;
use super::namespace::{
    NamespaceStorage, StorageRef, MODULE_CTX_TO_ID, PREFIX_TO_MODULE, STATEMENT_SUPPORTS,
};
use super::phase::ModelProcessingPhase;
use super::support::SupportHandle;

/// ソース表への添字。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u32);

impl SourceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// ソースが文イベントを流し込む先。
///
/// `start_statement` が偽を返したら、その文の子イベントは流さずに
/// 対応する `end_statement` だけを送る。
pub trait StatementWriter {
    fn start_statement(
        &mut self,
        position: usize,
        keyword: &Keyword,
        raw_argument: Option<&str>,
        span: Span,
    ) -> SchemaResult<bool>;

    fn store_statement(&mut self, expected_children: usize, fully_defined: bool) -> SchemaResult<()>;

    fn end_statement(&mut self) -> SchemaResult<()>;
}

/// 1 入力分の文イベント列。フェーズごとに一度呼び出される。
pub trait StatementStreamSource: fmt::Debug {
    /// このソースの識別。モジュール名と最新の revision から決まる。
    fn key(&self) -> SourceKey;

    fn write(
        &self,
        phase: ModelProcessingPhase,
        writer: &mut dyn StatementWriter,
    ) -> SchemaResult<()>;
}

/// フェーズ内の 1 巡がもたらした進捗。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseCompletionProgress {
    NoProgress,
    Progress,
    Finished,
}

/// リアクタが持つソース 1 本分の状態。
#[derive(Debug)]
pub(super) struct SourceContext {
    pub(super) id: SourceId,
    /// ストリームは走査の間だけ取り出される。
    pub(super) stream: Option<Box<dyn StatementStreamSource>>,
    pub(super) key: SourceKey,
    pub(super) root: Option<StmtId>,
    pub(super) storage: NamespaceStorage,
    pub(super) modifiers: Vec<InferenceAction>,
    /// 最初の要素が第一原因、残りは抑制される。
    pub(super) failures: Vec<SchemaError>,
    /// このソースが完了済みのフェーズ。
    pub(super) finished: ModelProcessingPhase,
    /// プレリンクで登録された、このソースが必要とする他ソース。
    pub(super) required: Vec<SourceKey>,
    /// ライブラリ由来のソースは最終モデルに含めない。
    pub(super) library: bool,
}

impl SourceContext {
    pub(super) fn new(id: SourceId, stream: Box<dyn StatementStreamSource>) -> Self {
        let key = stream.key();
        Self {
            id,
            stream: Some(stream),
            key,
            root: None,
            storage: NamespaceStorage::new(),
            modifiers: Vec::new(),
            failures: Vec::new(),
            finished: ModelProcessingPhase::Init,
            required: Vec::new(),
            library: false,
        }
    }
}

struct WriterFrame {
    /// 作成も再開もできなかった文は `None` で、部分木ごと読み飛ばす。
    stmt: Option<StmtId>,
    created: bool,
    skipped_child: bool,
    /// 部分木が揃っていて流し直しを省いた文。配下のイベントは
    /// 届いても捨てる。
    pruned: bool,
}

/// ソースストリームを文脈木へ写す書き込み器。
struct TreeWriter<'a> {
    rx: &'a mut BuildGlobalContext,
    source: SourceId,
    phase: ModelProcessingPhase,
    stack: Vec<WriterFrame>,
    progressed: bool,
}

impl TreeWriter<'_> {
    fn current_parent(&self) -> Option<&WriterFrame> {
        self.stack.last()
    }

    fn source_ref(&self, span: Span) -> SourceRef {
        SourceRef {
            source: self.rx.sources[self.source.index()].key.clone(),
            span,
        }
    }

    /// 流し直しを省いた部分木に、このフェーズ分の宣言完了を木の
    /// 上から届ける。子が先、親が後というストリームと同じ順序。
    /// 親自身の分は対応する end イベントが届ける。
    fn fire_declared_recursively(&mut self, stmt: StmtId) -> SchemaResult<()> {
        let children = self.rx.tree.declared_children(stmt).to_vec();
        for child in children {
            self.fire_declared_recursively(child)?;
            let node = self.rx.tree.node(child);
            if node.implicit {
                continue;
            }
            let support = node.support();
            support.on_declared(self.phase, self.rx, child)?;
        }
        Ok(())
    }
}

impl StatementWriter for TreeWriter<'_> {
    fn start_statement(
        &mut self,
        position: usize,
        keyword: &Keyword,
        raw_argument: Option<&str>,
        span: Span,
    ) -> SchemaResult<bool> {
        let parent = match self.current_parent() {
            Some(frame) => match frame.stmt {
                Some(stmt) if !frame.pruned => Some(stmt),
                _ => {
                    // 読み飛ばし中または省略済みの部分木の内側
                    self.stack.push(WriterFrame {
                        stmt: None,
                        created: false,
                        skipped_child: false,
                        pruned: false,
                    });
                    return Ok(false);
                }
            },
            None => None,
        };

        // 以前のフェーズの走査で作られた文脈を再開する
        let existing = match parent {
            Some(parent) => self.rx.tree.find_resumed_child(parent, position),
            None => self.rx.sources[self.source.index()].root,
        };
        if let Some(stmt) = existing {
            // 部分木が揃っている文は流し直さず、木の上で宣言の
            // 締めくくりだけをフェーズ分進める
            let pruned = self.rx.tree.node(stmt).fully_defined;
            if pruned {
                self.fire_declared_recursively(stmt)?;
            }
            self.stack.push(WriterFrame {
                stmt: Some(stmt),
                created: false,
                skipped_child: false,
                pruned,
            });
            return Ok(!pruned);
        }

        let at = self.source_ref(span);
        let support = self
            .rx
            .resolve_definition(self.source, keyword, raw_argument, self.phase)?;
        let Some(support) = support else {
            // 最後の走査でも定義が見つからない文はエラーになる
            if self.phase == ModelProcessingPhase::FullDeclaration {
                return Err(SourceError::UnknownStatement {
                    keyword: keyword.to_string(),
                    at,
                }
                .into());
            }
            trace!("フェーズ {} では {} を解決できないので飛ばす", self.phase, keyword);
            if let Some(frame) = self.stack.last_mut() {
                frame.skipped_child = true;
            }
            self.stack.push(WriterFrame {
                stmt: None,
                created: false,
                skipped_child: false,
                pruned: false,
            });
            return Ok(false);
        };

        let argument = support.parse_argument(raw_argument, &at)?;
        let mut node = StatementNode::new(
            parent,
            self.source,
            StmtShape::Resumed,
            support,
            keyword.to_string(),
            argument,
            raw_argument.map(str::to_owned),
            at,
        );
        node.stream_position = Some(position);
        let stmt = self.rx.tree.alloc(node)?;
        match parent {
            Some(parent) => self.rx.attach_declared_child(parent, stmt)?,
            None => self.rx.sources[self.source.index()].root = Some(stmt),
        }
        let support = self.rx.tree.node(stmt).support();
        support.on_statement_added(self.rx, stmt)?;

        self.progressed = true;
        self.stack.push(WriterFrame {
            stmt: Some(stmt),
            created: true,
            skipped_child: false,
            pruned: false,
        });
        Ok(true)
    }

    fn store_statement(&mut self, expected_children: usize, fully_defined: bool) -> SchemaResult<()> {
        let Some(frame) = self.stack.last() else {
            return Err(ReactorError::Internal {
                message: "開いていない文への store イベント".into(),
            }
            .into());
        };
        if let (Some(stmt), true) = (frame.stmt, frame.created) {
            let node = self.rx.tree.node_mut(stmt);
            node.declared.reserve(expected_children);
            node.fully_defined = fully_defined;
        }
        Ok(())
    }

    fn end_statement(&mut self) -> SchemaResult<()> {
        let Some(frame) = self.stack.pop() else {
            return Err(ReactorError::Internal {
                message: "開いていない文への end イベント".into(),
            }
            .into());
        };
        let Some(stmt) = frame.stmt else {
            return Ok(());
        };
        if frame.skipped_child {
            self.rx.tree.node_mut(stmt).fully_defined = false;
        }
        // このフェーズ分の宣言がここで閉じる
        let support = self.rx.tree.node(stmt).support();
        support.on_declared(self.phase, self.rx, stmt)
    }
}

impl BuildGlobalContext {
    /// ソースのイベント列を 1 フェーズ分流し込む。新しい文脈が
    /// 1 つでも生まれたら真。
    pub(super) fn stream_source(
        &mut self,
        source_index: usize,
        phase: ModelProcessingPhase,
    ) -> SchemaResult<bool> {
        let stream = self.sources[source_index]
            .stream
            .take()
            .ok_or_else(|| ReactorError::Internal {
                message: "ソースストリームが走査中に再入された".into(),
            })?;
        let mut writer = TreeWriter {
            rx: self,
            source: SourceId(source_index as u32),
            phase,
            stack: Vec::new(),
            progressed: false,
        };
        let outcome = stream.write(phase, &mut writer);
        let progressed = writer.progressed;
        self.sources[source_index].stream = Some(stream);
        outcome?;
        Ok(progressed)
    }

    /// キーワードから文サポートを解決する。
    ///
    /// 素のキーワードは現フェーズの束から、接頭辞付きは拡張が登録
    /// した文サポートの表から引く。見つかったら引数による特殊化を
    /// 適用する。
    pub(super) fn resolve_definition(
        &mut self,
        source: SourceId,
        keyword: &Keyword,
        raw_argument: Option<&str>,
        phase: ModelProcessingPhase,
    ) -> SchemaResult<Option<SupportHandle>> {
        let found = match keyword {
            Keyword::Plain(name) => self
                .config
                .bundle_for(phase)
                .and_then(|bundle| bundle.support_for(name)),
            Keyword::Prefixed { prefix, name } => {
                let Ok(local) = Unqualified::try_new(name) else {
                    return Ok(None);
                };
                let Some(module_ctx) =
                    self.get_ns(StorageRef::Source(source), PREFIX_TO_MODULE, prefix.clone())?
                else {
                    return Ok(None);
                };
                let Some(module) =
                    self.get_ns(StorageRef::Global, MODULE_CTX_TO_ID, module_ctx)?
                else {
                    return Ok(None);
                };
                self.get_ns(
                    StorageRef::Global,
                    STATEMENT_SUPPORTS,
                    QualifiedName { module, local },
                )?
            }
        };
        Ok(found.map(|support| {
            support
                .specialize_for_argument(raw_argument)
                .unwrap_or(support)
        }))
    }

    /// ソースのルートに現フェーズの完了を試みさせる。
    ///
    /// 木が完了しても、このフェーズの動作が未処理のうちはソースは
    /// 完了しない。静止時の棄却がそれらを畳んでから確定する。
    pub(super) fn try_finish_source_phase(
        &mut self,
        source_index: usize,
        phase: ModelProcessingPhase,
    ) -> SchemaResult<PhaseCompletionProgress> {
        let Some(root) = self.sources[source_index].root else {
            return Ok(PhaseCompletionProgress::NoProgress);
        };
        let mut fired = Vec::new();
        let finished = self.tree.try_complete(root, phase, &mut fired)?;
        let progressed = !fired.is_empty();
        self.resolve_phase_listeners(fired);
        if finished && !self.has_pending_modifiers(source_index, phase) {
            self.sources[source_index].finished = phase;
            Ok(PhaseCompletionProgress::Finished)
        } else if progressed {
            Ok(PhaseCompletionProgress::Progress)
        } else {
            Ok(PhaseCompletionProgress::NoProgress)
        }
    }

    /// このソースが必要とする他ソースを登録する。リビジョン付きなら
    /// 正確な一致、無しなら名前だけの要求になる。
    pub fn add_required_source(&mut self, source: SourceId, key: SourceKey) {
        let required = &mut self.sources[source.index()].required;
        if !required.contains(&key) {
            required.push(key);
        }
    }
}
