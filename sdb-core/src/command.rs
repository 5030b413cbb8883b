//! デバッガコマンド
//!
//! 対話シェルの入力行を前置一致でコマンドへディスパッチします。

/// トークンが候補の前置一致かどうか
fn is_prefix(token: &str, of: &str) -> bool {
    !token.is_empty() && of.starts_with(token)
}

/// デバッガコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 実行継続
    Continue,
    /// 1命令ステップ実行
    Step,
    /// ヘルプ表示（トピック指定は任意）
    Help(Option<String>),
    /// レジスタ操作
    Register(RegisterCommand),
    /// ブレークポイント操作
    Breakpoint(BreakpointCommand),
}

/// レジスタ操作のサブコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterCommand {
    /// 読み取り。`None`は汎用レジスタの一覧、`Some("all")`は全レジスタ、
    /// それ以外は単一レジスタの名前
    Read(Option<String>),
    /// 書き込み
    Write { register: String, value: String },
    /// 使い方の表示
    Help,
}

/// ブレークポイント操作のサブコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointCommand {
    /// 一覧表示
    List,
    /// アドレス文字列を指定して設定
    Set(String),
    /// ID文字列を指定して有効化
    Enable(String),
    /// ID文字列を指定して無効化
    Disable(String),
    /// ID文字列を指定して削除
    Delete(String),
    /// 使い方の表示
    Help,
}

impl Command {
    /// コマンド文字列をパースする
    ///
    /// 先頭トークンの前置一致でディスパッチし、未知のコマンドは`None`を
    /// 返します。サブコマンドの形式が崩れている場合は該当トピックの
    /// ヘルプ表示になります。
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.trim().split_whitespace().collect();
        let (&command, rest) = parts.split_first()?;

        if is_prefix(command, "continue") {
            Some(Command::Continue)
        } else if is_prefix(command, "step") {
            Some(Command::Step)
        } else if is_prefix(command, "help") {
            Some(Command::Help(rest.first().map(|s| s.to_string())))
        } else if is_prefix(command, "register") {
            Some(Command::Register(RegisterCommand::parse(rest)))
        } else if is_prefix(command, "breakpoint") {
            Some(Command::Breakpoint(BreakpointCommand::parse(rest)))
        } else {
            None
        }
    }
}

impl RegisterCommand {
    fn parse(args: &[&str]) -> Self {
        let Some((&sub, rest)) = args.split_first() else {
            return RegisterCommand::Help;
        };
        if is_prefix(sub, "read") {
            match rest {
                [] => RegisterCommand::Read(None),
                [name] => RegisterCommand::Read(Some(name.to_string())),
                _ => RegisterCommand::Help,
            }
        } else if is_prefix(sub, "write") {
            match rest {
                [register, value] => RegisterCommand::Write {
                    register: register.to_string(),
                    value: value.to_string(),
                },
                _ => RegisterCommand::Help,
            }
        } else {
            RegisterCommand::Help
        }
    }
}

impl BreakpointCommand {
    fn parse(args: &[&str]) -> Self {
        let Some((&sub, rest)) = args.split_first() else {
            return BreakpointCommand::Help;
        };
        if is_prefix(sub, "list") {
            return BreakpointCommand::List;
        }
        let Some(&argument) = rest.first() else {
            return BreakpointCommand::Help;
        };
        let argument = argument.to_string();
        if is_prefix(sub, "set") {
            BreakpointCommand::Set(argument)
        } else if is_prefix(sub, "enable") {
            BreakpointCommand::Enable(argument)
        } else if is_prefix(sub, "disable") {
            BreakpointCommand::Disable(argument)
        } else if is_prefix(sub, "delete") {
            BreakpointCommand::Delete(argument)
        } else {
            BreakpointCommand::Help
        }
    }
}
