//! # hlang-core - 模块IR与声明数据库
//!
//! 提供编译器的内存中程序表示：类型引用、表达式、声明、模块，
//! 以及跨模块名字解析所依赖的声明数据库。
//!
//! ## 主要组件
//!
//! - 类型系统：`TypeReference` 及其谓词/构造函数
//! - 表达式：`Statement` / `Expression`（语句内按 `ExpressionIndex` 寻址）
//! - 声明：别名/枚举/结构体/联合体/函数/全局变量
//! - 声明数据库：`DeclarationDatabase`，O(1) 查找与别名链解析
//! - 访问器：遍历模块内所有类型引用与表达式
//! - 序列化：JSON（可读）与 bincode（紧凑二进制），两者均可逆

pub mod database;
pub mod declarations;
pub mod error;
pub mod expressions;
pub mod module;
pub mod serialization;
pub mod types;
pub mod visitor;

pub use database::{Declaration, DeclarationDatabase};
pub use declarations::{
    AliasTypeDeclaration, EnumDeclaration, EnumValue, FunctionDeclaration, FunctionDefinition,
    GlobalVariableDeclaration, Linkage, SourcePosition, SourceRange, SourceRangeLocation,
    StructDeclaration, UnionDeclaration,
};
pub use error::{CoreError, CoreResult};
pub use expressions::{
    AccessExpression, AccessType, AssignmentExpression, BinaryExpression, BinaryOperation,
    BlockExpression, CallExpression, CastExpression, CastType, ConstantArrayExpression,
    ConstantExpression, EnumExpression, Expression, ExpressionData, ExpressionIndex, IfExpression,
    InstantiateExpression, InstantiateExpressionType, InstantiateMemberValuePair,
    NullPointerExpression, ParenthesisExpression, ReturnExpression, Statement, StructExpression,
    TypeExpression, UnaryExpression, UnaryOperation, UnionExpression,
    VariableDeclarationExpression, VariableExpression, WhileLoopExpression,
};
pub use module::{
    ImportModuleWithAlias, LanguageVersion, Module, ModuleDeclarations, ModuleDefinitions,
    ModuleDependencies, NameMangling,
};
pub use types::{
    BuiltinTypeReference, ConstantArrayType, CustomTypeReference, FundamentalType, FunctionType,
    IntegerType, ModuleReference, ParameterType, PointerType, TypeInstance, TypeReference,
};
