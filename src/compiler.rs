//! コンパイラのメイン処理モジュール
//!
//! このモジュールは、複数ソースの読み込みからリアクタの駆動、
//! 診断報告までのコンパイルパイプライン全体を管理し、
//! 複数のエラーを蓄積しながら処理を進める機能を提供します。

use crate::error::{ErrorCollector, ReactorError, SchemaError, SchemaResult};
use crate::model::{EffectiveModel, FeatureSet, SourceKey};
use crate::reactor::{ParserMode, StatementStreamSource};
use crate::source::TextSource;
use crate::vocab;
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// コンパイル状態を管理する構造体
///
/// 読み込んだ全ソースのテキストを保持し、各診断をその発生元
/// ファイルに対応づけます。
pub struct CompilationState {
    pub files: SimpleFiles<String, String>,
    file_ids: HashMap<SourceKey, usize>,
    first_file_id: Option<usize>,
    pub error_collector: ErrorCollector,
}

impl CompilationState {
    /// 新しいコンパイル状態を作成
    pub fn new() -> Self {
        Self {
            files: SimpleFiles::new(),
            file_ids: HashMap::new(),
            first_file_id: None,
            error_collector: ErrorCollector::new(),
        }
    }

    /// ソースファイルを読み込んで構文解析する
    ///
    /// 失敗した場合は診断を蓄積して`None`を返します。
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Option<TextSource> {
        let name = path.as_ref().display().to_string();
        match fs::read_to_string(path.as_ref()) {
            Ok(text) => self.load_text(&name, text),
            Err(e) => {
                self.add_error(SchemaError::Io(format!(
                    "ソースファイル {} を読み込めません: {}",
                    name, e
                )));
                None
            }
        }
    }

    /// 文字列をソースとして構文解析する(テスト用)
    pub fn load_text(&mut self, name: &str, text: String) -> Option<TextSource> {
        let file_id = self.files.add(name.to_owned(), text.clone());
        if self.first_file_id.is_none() {
            self.first_file_id = Some(file_id);
        }
        match TextSource::parse(&text) {
            Ok(source) => {
                self.file_ids.insert(source.key(), file_id);
                Some(source)
            }
            Err(error) => {
                self.error_collector.add_error(error, file_id);
                None
            }
        }
    }

    /// エラーを追加
    pub fn add_error(&mut self, error: SchemaError) {
        let file_id = self.file_id_for(&error);
        self.error_collector.add_error(error, file_id);
    }

    /// ビルド失敗のエラーを診断列へ展開して追加
    ///
    /// フェーズ単位の集約エラーはソースごとの個別原因に分解し、
    /// それぞれを発生元ファイルに対応づけて蓄積します。
    pub fn add_build_error(&mut self, error: SchemaError) {
        match error {
            SchemaError::Reactor(ReactorError::SomeModifiersUnresolved {
                phase,
                source,
                cause,
                suppressed,
            }) => {
                log::debug!("フェーズ{}がソース{}で完了しなかった", phase, source);
                self.add_build_error(*cause);
                for error in suppressed {
                    self.add_build_error(error);
                }
            }
            error => self.add_error(error),
        }
    }

    /// 診断情報を報告
    pub fn report_diagnostics(&self) -> SchemaResult<()> {
        let writer = StandardStream::stderr(ColorChoice::Always);
        let config = codespan_reporting::term::Config::default();

        // エラーを報告
        for error in self.error_collector.errors() {
            let diagnostic = error.to_diagnostic();
            codespan_reporting::term::emit(&mut writer.lock(), &config, &self.files, &diagnostic)
                .map_err(|e| SchemaError::Io(format!("診断を出力できません: {}", e)))?;
        }

        // 警告を報告
        for warning in self.error_collector.warnings() {
            let diagnostic = warning.to_diagnostic();
            codespan_reporting::term::emit(&mut writer.lock(), &config, &self.files, &diagnostic)
                .map_err(|e| SchemaError::Io(format!("診断を出力できません: {}", e)))?;
        }

        Ok(())
    }

    /// エラーがあるかチェック
    pub fn has_errors(&self) -> bool {
        self.error_collector.has_errors()
    }

    /// エラー数を取得
    pub fn error_count(&self) -> usize {
        self.error_collector.error_count()
    }

    /// 発生位置を持つエラーをその発生元ファイルに対応づける。
    /// 位置を持たないエラーはラベル無しで報告されるため、
    /// 代表として最初のファイルを使う。
    fn file_id_for(&self, error: &SchemaError) -> usize {
        let key = match error {
            SchemaError::Source(e) => Some(&e.source_ref().source),
            _ => None,
        };
        key.and_then(|key| self.file_ids.get(key))
            .copied()
            .or(self.first_file_id)
            .unwrap_or(0)
    }
}

impl Default for CompilationState {
    fn default() -> Self {
        Self::new()
    }
}

/// コンパイルパイプライン
pub struct CompilationPipeline {
    state: CompilationState,
    sources: Vec<TextSource>,
    libraries: Vec<TextSource>,
    mode: ParserMode,
    features: Option<FeatureSet>,
    verbose: bool,
}

impl CompilationPipeline {
    /// 新しいコンパイルパイプラインを作成
    pub fn new(verbose: bool) -> Self {
        Self {
            state: CompilationState::new(),
            sources: Vec::new(),
            libraries: Vec::new(),
            mode: ParserMode::default(),
            features: None,
            verbose,
        }
    }

    /// コンパイル状態への参照を取得
    pub fn state(&self) -> &CompilationState {
        &self.state
    }

    /// 状態への可変参照を取得
    pub fn state_mut(&mut self) -> &mut CompilationState {
        &mut self.state
    }

    /// インポート解決の動作モードを設定
    pub fn set_parser_mode(&mut self, mode: ParserMode) {
        self.mode = mode;
    }

    /// 有効と見なす機能の集合を設定。`None`なら全機能が有効。
    pub fn set_supported_features(&mut self, features: Option<FeatureSet>) {
        self.features = features;
    }

    /// 主ソースファイルを読み込む
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> bool {
        match self.state.load_file(path) {
            Some(source) => {
                self.sources.push(source);
                true
            }
            None => false,
        }
    }

    /// ライブラリソースファイルを読み込む
    ///
    /// ライブラリは他のソースから要求されたときだけモデルに
    /// 読み込まれます。
    pub fn load_library_file<P: AsRef<Path>>(&mut self, path: P) -> bool {
        match self.state.load_file(path) {
            Some(source) => {
                self.libraries.push(source);
                true
            }
            None => false,
        }
    }

    /// 文字列を主ソースとして読み込む(テスト用)
    pub fn load_text(&mut self, name: &str, text: String) -> bool {
        match self.state.load_text(name, text) {
            Some(source) => {
                self.sources.push(source);
                true
            }
            None => false,
        }
    }

    /// 文字列をライブラリソースとして読み込む(テスト用)
    pub fn load_library_text(&mut self, name: &str, text: String) -> bool {
        match self.state.load_text(name, text) {
            Some(source) => {
                self.libraries.push(source);
                true
            }
            None => false,
        }
    }

    /// リアクタを駆動して実効モデルを組み立てる
    ///
    /// モデルのエラーは状態に蓄積され`None`が返ります。`Err`は
    /// リアクタ構成の欠陥などモデル外の失敗だけを表します。
    pub fn build(&mut self) -> SchemaResult<Option<EffectiveModel>> {
        if self.verbose {
            println!("ステップ: リアクタを構築");
        }

        let reactor = vocab::standard_reactor()?;
        let mut build = reactor.new_build();
        build.set_parser_mode(self.mode);
        build.set_supported_features(self.features.clone())?;
        for source in self.sources.drain(..) {
            build.add_source(Box::new(source));
        }
        for library in self.libraries.drain(..) {
            build.add_library_source(Box::new(library));
        }

        if self.verbose {
            println!("ステップ: モデル構築を開始");
        }

        match build.build_effective() {
            Ok(model) => Ok(Some(model)),
            Err(error) => {
                self.state.add_build_error(error);
                Ok(None)
            }
        }
    }

    /// エラーレポートを生成
    pub fn report_errors(&self) -> SchemaResult<()> {
        self.state.report_diagnostics()?;

        if self.state.has_errors() {
            eprintln!(
                "\nコンパイルエラー: {} 個のエラーが見つかりました",
                self.state.error_count()
            );
        }

        Ok(())
    }

    /// パイプライン全体を実行
    ///
    /// 構文解析に失敗したソースがあっても残りの入力を読み込み、
    /// 診断を出し切ってから結果を返します。
    pub fn run(
        &mut self,
        inputs: &[PathBuf],
        libraries: &[PathBuf],
    ) -> SchemaResult<Option<EffectiveModel>> {
        if self.verbose {
            println!("ステップ: 字句解析と構文解析を開始");
        }
        for path in inputs {
            self.load_file(path);
        }
        for path in libraries {
            self.load_library_file(path);
        }

        // 構文段階のエラーがあるときはリアクタを走らせない
        if self.state.has_errors() {
            self.report_errors()?;
            return Ok(None);
        }

        let model = self.build()?;
        self.report_errors()?;
        Ok(model)
    }
}
