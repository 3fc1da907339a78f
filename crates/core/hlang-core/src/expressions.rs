//! 语句与表达式
//!
//! 每个 `Statement` 持有一个有序的表达式列表：第 0 个是根表达式，
//! 其余通过 `ExpressionIndex`（同一语句内的 0 基指针）寻址。
//! 不变式：语句内所有 `ExpressionIndex` 严格小于表达式数量。

use serde::{Deserialize, Serialize};

use crate::declarations::{EnumDeclaration, SourceRange, StructDeclaration, UnionDeclaration};
use crate::types::TypeReference;

/// 同一语句内的表达式下标
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ExpressionIndex {
    pub expression_index: u64,
}

impl ExpressionIndex {
    pub fn new(expression_index: u64) -> Self {
        Self { expression_index }
    }

    pub fn as_usize(self) -> usize {
        self.expression_index as usize
    }
}

/// 一条语句：有序表达式列表，首个为根
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub expressions: Vec<Expression>,
}

impl Statement {
    /// 按下标取表达式。越界即 IR 畸形。
    pub fn expression_at(&self, index: ExpressionIndex) -> Option<&Expression> {
        self.expressions.get(index.as_usize())
    }

    pub fn root_expression(&self) -> Option<&Expression> {
        self.expressions.first()
    }
}

/// 访问方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    Read,
    Write,
    ReadWrite,
}

/// 成员访问（结构体成员、枚举值、模块别名限定名）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessExpression {
    pub expression: ExpressionIndex,
    pub member_name: String,
    pub access_type: AccessType,
}

/// 二元运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    LogicalAnd,
    LogicalOr,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    BitShiftLeft,
    BitShiftRight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpression {
    pub left_hand_side: ExpressionIndex,
    pub right_hand_side: ExpressionIndex,
    pub operation: BinaryOperation,
}

/// 赋值。`additional_operation` 表示复合赋值（`+=` 等）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentExpression {
    pub left_hand_side: ExpressionIndex,
    pub right_hand_side: ExpressionIndex,
    pub additional_operation: Option<BinaryOperation>,
}

/// 语句块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockExpression {
    pub statements: Vec<Statement>,
}

/// 调用。被调方是同语句内的表达式（变量或成员访问），
/// 按改名规则解析到目标函数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallExpression {
    pub expression: ExpressionIndex,
    pub arguments: Vec<ExpressionIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastType {
    Numeric,
    BitCast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastExpression {
    pub source: ExpressionIndex,
    pub destination_type: TypeReference,
    pub cast_type: CastType,
}

/// 常量。`data` 为文本编码的字面量，按 `type_reference` 解释，
/// 常量位宽与类型精度必须一致（在降级时检查）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantExpression {
    pub type_reference: TypeReference,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantArrayExpression {
    pub type_reference: TypeReference,
    pub array_data: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfExpression {
    pub condition: Statement,
    pub then_statements: Vec<Statement>,
    pub else_statements: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstantiateExpressionType {
    Default,
    Explicit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantiateMemberValuePair {
    pub member_name: String,
    pub value: Statement,
}

/// 结构体实例化。`Default` 允许省略成员（取声明处默认值），
/// `Explicit` 要求列出全部成员。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantiateExpression {
    pub instantiate_type: InstantiateExpressionType,
    pub members: Vec<InstantiateMemberValuePair>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullPointerExpression {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParenthesisExpression {
    pub expression: ExpressionIndex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnExpression {
    pub expression: Option<ExpressionIndex>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructExpression {
    pub declaration: StructDeclaration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumExpression {
    pub declaration: EnumDeclaration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionExpression {
    pub declaration: UnionDeclaration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeExpression {
    pub type_reference: TypeReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOperation {
    Not,
    BitwiseNot,
    Minus,
    AddressOf,
    Indirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpression {
    pub expression: ExpressionIndex,
    pub operation: UnaryOperation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableExpression {
    pub name: String,
    pub access_type: AccessType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDeclarationExpression {
    pub name: String,
    pub is_mutable: bool,
    pub right_hand_side: ExpressionIndex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhileLoopExpression {
    pub condition: Statement,
    pub then_statements: Vec<Statement>,
}

/// 表达式的和类型。二进制序列化时以变体序号作为整数标签。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionData {
    AccessExpression(AccessExpression),
    AssignmentExpression(AssignmentExpression),
    BinaryExpression(BinaryExpression),
    BlockExpression(BlockExpression),
    CallExpression(CallExpression),
    CastExpression(CastExpression),
    ConstantExpression(ConstantExpression),
    ConstantArrayExpression(ConstantArrayExpression),
    EnumExpression(EnumExpression),
    IfExpression(IfExpression),
    InstantiateExpression(InstantiateExpression),
    NullPointerExpression(NullPointerExpression),
    ParenthesisExpression(ParenthesisExpression),
    ReturnExpression(ReturnExpression),
    StructExpression(StructExpression),
    TypeExpression(TypeExpression),
    UnaryExpression(UnaryExpression),
    UnionExpression(UnionExpression),
    VariableExpression(VariableExpression),
    VariableDeclarationExpression(VariableDeclarationExpression),
    WhileLoopExpression(WhileLoopExpression),
}

/// 带可选源码范围的表达式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub data: ExpressionData,
    pub source_range: Option<SourceRange>,
}

pub fn create_expression(data: ExpressionData) -> Expression {
    Expression {
        data,
        source_range: None,
    }
}

pub fn create_statement(expressions: Vec<Expression>) -> Statement {
    Statement { expressions }
}

pub fn create_constant_expression(type_reference: TypeReference, data: &str) -> Expression {
    create_expression(ExpressionData::ConstantExpression(ConstantExpression {
        type_reference,
        data: data.to_string(),
    }))
}

pub fn create_variable_expression(name: &str, access_type: AccessType) -> Expression {
    create_expression(ExpressionData::VariableExpression(VariableExpression {
        name: name.to_string(),
        access_type,
    }))
}

pub fn create_return_expression(expression: Option<ExpressionIndex>) -> Expression {
    create_expression(ExpressionData::ReturnExpression(ReturnExpression {
        expression,
    }))
}

pub fn create_null_pointer_expression() -> Expression {
    create_expression(ExpressionData::NullPointerExpression(
        NullPointerExpression {},
    ))
}

/// 枚举值访问：`Enum_name.Member`，根为访问表达式，第 1 个为变量表达式
pub fn create_enum_value_expressions(enum_name: &str, member_name: &str) -> Vec<Expression> {
    vec![
        create_expression(ExpressionData::AccessExpression(AccessExpression {
            expression: ExpressionIndex::new(1),
            member_name: member_name.to_string(),
            access_type: AccessType::Read,
        })),
        create_variable_expression(enum_name, AccessType::Read),
    ]
}

pub fn create_instantiate_expression(
    instantiate_type: InstantiateExpressionType,
    members: Vec<InstantiateMemberValuePair>,
) -> Expression {
    create_expression(ExpressionData::InstantiateExpression(
        InstantiateExpression {
            instantiate_type,
            members,
        },
    ))
}
