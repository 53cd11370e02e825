//! Textual rendering of IR for diagnostics and logs

use super::function::Function;
use super::instruction::InstKind;
use super::module::SymbolTable;
use super::value::{BlockId, Constant, InstId, Value};
use std::fmt;

/// Renders one instruction as a single line, e.g.
/// `%5 = select i1 %0, i32* %arg1, i32* %arg2`
pub struct InstDisplay<'a> {
    func: &'a Function,
    symbols: &'a SymbolTable,
    id: InstId,
}

impl<'a> InstDisplay<'a> {
    /// Wraps `id` of `func` for printing
    pub fn new(func: &'a Function, symbols: &'a SymbolTable, id: InstId) -> Self {
        Self { func, symbols, id }
    }

    fn value(&self, value: &Value) -> String {
        match value {
            Value::Inst(id) => format!("%{}", id.0),
            Value::Arg(index) => format!("%arg{}", index),
            Value::Const(Constant::Int { value, .. }) => value.to_string(),
            Value::Const(Constant::Null(_)) => "null".to_string(),
            Value::Const(Constant::Undef(_)) => "undef".to_string(),
            Value::Global(id) => format!("@{}", self.symbols.global_name(*id).unwrap_or("?")),
            Value::Function(id) => {
                format!("@{}", self.symbols.function_name(*id).unwrap_or("?"))
            }
        }
    }

    fn typed(&self, value: &Value) -> String {
        match self.func.value_type(value, self.symbols) {
            Ok(ty) => format!("{} {}", ty, self.value(value)),
            Err(_) => format!("<?> {}", self.value(value)),
        }
    }

    fn typed_list(&self, values: &[Value]) -> String {
        values
            .iter()
            .map(|v| self.typed(v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn label(&self, block: BlockId) -> String {
        match self.func.block(block) {
            Some(b) => format!("label %{}", b.name),
            None => format!("label %bb{}", block.0),
        }
    }
}

impl fmt::Display for InstDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(data) = self.func.inst(self.id) else {
            return write!(f, "<erased %{}>", self.id.0);
        };
        if data.ty != super::types::Type::Void {
            write!(f, "%{} = ", self.id.0)?;
        }
        match &data.kind {
            InstKind::Load { ptr } => write!(f, "load {}, {}", data.ty, self.typed(ptr)),
            InstKind::Store { value, ptr } => {
                write!(f, "store {}, {}", self.typed(value), self.typed(ptr))
            }
            InstKind::Binary { op, lhs, rhs } => write!(
                f,
                "{} {}, {}",
                op.mnemonic(),
                self.typed(lhs),
                self.value(rhs)
            ),
            InstKind::ICmp { pred, lhs, rhs } => write!(
                f,
                "icmp {} {}, {}",
                pred.mnemonic(),
                self.typed(lhs),
                self.value(rhs)
            ),
            InstKind::Cast { op, value } => {
                write!(f, "{} {} to {}", op.mnemonic(), self.typed(value), data.ty)
            }
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => write!(
                f,
                "select {}, {}, {}",
                self.typed(cond),
                self.typed(on_true),
                self.typed(on_false)
            ),
            InstKind::Phi { incoming } => {
                write!(f, "phi {} ", data.ty)?;
                for (i, (value, block)) in incoming.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    let name = self
                        .func
                        .block(*block)
                        .map(|b| b.name.clone())
                        .unwrap_or_else(|| format!("bb{}", block.0));
                    write!(f, "[ {}, %{} ]", self.value(value), name)?;
                }
                Ok(())
            }
            InstKind::GetElementPtr { base, indices } => {
                write!(f, "getelementptr {}", self.typed(base))?;
                for index in indices {
                    write!(f, ", {}", self.typed(index))?;
                }
                Ok(())
            }
            InstKind::Call { callee, args } => write!(
                f,
                "call {} {}({})",
                data.ty,
                self.value(callee),
                self.typed_list(args)
            ),
            InstKind::Intrinsic { id, args } => write!(
                f,
                "call {} @{}({})",
                data.ty,
                id.name(),
                self.typed_list(args)
            ),
            InstKind::Ret { value: Some(value) } => write!(f, "ret {}", self.typed(value)),
            InstKind::Ret { value: None } => write!(f, "ret void"),
            InstKind::Br { target } => write!(f, "br {}", self.label(*target)),
            InstKind::CondBr {
                cond,
                then_block,
                else_block,
            } => write!(
                f,
                "br {}, {}, {}",
                self.typed(cond),
                self.label(*then_block),
                self.label(*else_block)
            ),
            InstKind::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Format a single instruction
pub fn format_inst(func: &Function, symbols: &SymbolTable, id: InstId) -> String {
    InstDisplay::new(func, symbols, id).to_string()
}

/// Format a whole function body, one instruction per line
pub fn format_function(func: &Function, symbols: &SymbolTable) -> String {
    let params = func
        .params
        .iter()
        .enumerate()
        .map(|(i, ty)| format!("{} %arg{}", ty, i))
        .collect::<Vec<_>>()
        .join(", ");
    if func.is_declaration() {
        return format!("declare {} @{}({})\n", func.ret, func.name, params);
    }

    let mut out = format!("define {} @{}({}) {{\n", func.ret, func.name, params);
    for block_id in func.block_ids() {
        let Some(block) = func.block(block_id) else {
            continue;
        };
        out.push_str(&format!("{}:\n", block.name));
        for &id in block.insts() {
            out.push_str(&format!("  {}\n", format_inst(func, symbols, id)));
        }
    }
    out.push_str("}\n");
    out
}
