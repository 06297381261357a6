//! 文脈の回収 (sweep)
//!
//! grouping や augment の展開で生まれる文脈の多くは、有効モデルが
//! できあがった後には二度と参照されない。ここでは参照カウントで
//! 「まだ使われている」文脈を押さえつつ、完了済みで誰からも参照
//! されない部分木の名前空間格納を手放す。カウンタが壊れそうな
//! ときは回収全体を止め、メモリと引き換えに状態の健全性を守る。

use log::{debug, warn};

use super::context::{StatementTree, StmtId, StmtShape};
use super::namespace::NamespaceStorage;
use super::phase::ModelProcessingPhase;

/// 参照なし。回収の候補になり得る通常状態。
const REFCOUNT_NONE: u32 = 0;
/// カウンタが信用できなくなった文脈。二度と回収しない。
const REFCOUNT_DEFUNCT: u32 = u32::MAX - 2;
/// 回収処理の途中。
const REFCOUNT_SWEEPING: u32 = u32::MAX - 1;
/// 回収済み。局所格納は手放されている。
const REFCOUNT_SWEPT: u32 = u32::MAX;
/// 通常カウンタとして許す上限。
const REFCOUNT_MAX: u32 = u32::MAX - 3;

impl StatementTree {
    /// 文脈を参照で留める。親は子の回収条件を通じて暗黙に留まる。
    pub fn pin(&mut self, id: StmtId) {
        let node = self.node_mut(id);
        match node.refcount {
            REFCOUNT_DEFUNCT => {}
            REFCOUNT_SWEEPING | REFCOUNT_SWEPT => {
                warn!("回収済みの文脈 {id:?} を留めようとした");
                node.refcount = REFCOUNT_DEFUNCT;
            }
            REFCOUNT_MAX => {
                debug!("文脈 {id:?} の参照カウンタが上限に達したため回収を止める");
                node.refcount = REFCOUNT_DEFUNCT;
            }
            count => node.refcount = count + 1,
        }
    }

    pub fn unpin(&mut self, id: StmtId) {
        let node = self.node_mut(id);
        match node.refcount {
            REFCOUNT_DEFUNCT => {}
            REFCOUNT_NONE | REFCOUNT_SWEEPING | REFCOUNT_SWEPT => {
                warn!("文脈 {id:?} の参照カウンタが負になりかけたため回収を止める");
                node.refcount = REFCOUNT_DEFUNCT;
            }
            count => node.refcount = count - 1,
        }
    }

    pub fn is_pinned(&self, id: StmtId) -> bool {
        matches!(self.node(id).refcount, 1..=REFCOUNT_MAX)
    }

    pub fn is_swept(&self, id: StmtId) -> bool {
        self.node(id).refcount == REFCOUNT_SWEPT
    }

    /// 部分木を可能な範囲で回収し、回収できた文脈数を返す。
    ///
    /// 回収できるのは、ビルドを終えた文脈のうち自分も子孫も参照で
    /// 留められていないものだけ。代理の回収はその実体の参照を外す
    /// ので、呼び出し側は回収が進まなくなるまで繰り返してよい。
    pub fn sweep(&mut self, root: StmtId) -> usize {
        let mut swept = 0;
        self.sweep_recursive(root, &mut swept);
        if swept > 0 {
            debug!("{swept} 文脈分の局所格納を手放した");
        }
        swept
    }

    fn sweep_recursive(&mut self, id: StmtId, swept: &mut usize) -> bool {
        match self.node(id).refcount {
            REFCOUNT_SWEPT => return true,
            REFCOUNT_DEFUNCT | REFCOUNT_SWEEPING => return false,
            REFCOUNT_NONE => {}
            _ => return false,
        }
        if !self.node(id).is_completed(ModelProcessingPhase::EffectiveModel) {
            return false;
        }

        self.node_mut(id).refcount = REFCOUNT_SWEEPING;

        // 代理は自分の子を持たない。実体側の子は実体の回収が扱う。
        let children = match self.node(id).shape() {
            StmtShape::Replica { .. } => Vec::new(),
            _ => {
                let node = self.node(id);
                node.declared.iter().chain(node.effective.iter()).copied().collect()
            }
        };
        let mut all_children_swept = true;
        for child in children {
            if !self.sweep_recursive(child, swept) {
                all_children_swept = false;
            }
        }

        if !all_children_swept {
            self.node_mut(id).refcount = REFCOUNT_NONE;
            return false;
        }

        if let StmtShape::Replica { original } = *self.node(id).shape() {
            self.unpin(original);
        }
        let node = self.node_mut(id);
        node.storage = NamespaceStorage::new();
        node.phase_listeners = Vec::new();
        node.refcount = REFCOUNT_SWEPT;
        *swept += 1;
        true
    }
}
