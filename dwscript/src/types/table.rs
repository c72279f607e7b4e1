//! Registrable type table

use super::*;
use crate::util::strip_parent_suffix;

fn key(name: &str) -> String {
    normalize(strip_parent_suffix(name))
}

/// Exception classes every program can raise and catch
const BUILTIN_EXCEPTIONS: &[&str] = &[
    "EAssertionFailed",
    "EScriptStackOverflow",
    "EConvertError",
    "EDivByZero",
    "ERangeError",
    "EInvalidCast",
];

/// The default [`TypeRegistry`]: declarations register into it through
/// `&self`, so one table can be shared by the evaluator and the
/// declaration collaborator.
#[derive(Default)]
pub struct TypeTable {
    classes: RefCell<HashMap<String, Rc<ClassInfo>>>,
    interfaces: RefCell<HashMap<String, Rc<InterfaceInfo>>>,
    records: RefCell<HashMap<String, Rc<RecordType>>>,
    enums: RefCell<HashMap<String, Rc<EnumType>>>,
    enum_values: RefCell<HashMap<String, (Rc<EnumType>, i64)>>,
    arrays: RefCell<HashMap<String, Rc<ArrayType>>>,
    subranges: RefCell<HashMap<String, Rc<SubrangeType>>>,
    function_pointers: RefCell<HashMap<String, Rc<FunctionPointerType>>>,
    helpers: RefCell<HashMap<String, HashMap<String, HelperMethod>>>,
    operators: RefCell<Vec<OperatorOverload>>,
}

impl TypeTable {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table preloaded with `TObject`, the exception hierarchy and the
    /// standard helper methods
    pub fn standard() -> Self {
        let table = Self::new();
        let object = table.register_class(ClassInfo::new("TObject", None));
        let exception = table.register_class(
            ClassInfo::new("Exception", Some(object))
                .with_field(FieldInfo::new("Message", Type::String)),
        );
        for name in BUILTIN_EXCEPTIONS {
            table.register_class(ClassInfo::new(*name, Some(Rc::clone(&exception))));
        }
        crate::interp::helpers::register_standard_helpers(&table);
        table
    }

    pub fn register_class(&self, class: ClassInfo) -> Rc<ClassInfo> {
        let class = Rc::new(class);
        self.classes
            .borrow_mut()
            .insert(key(&class.name), Rc::clone(&class));
        class
    }

    pub fn register_interface(&self, interface: InterfaceInfo) -> Rc<InterfaceInfo> {
        let interface = Rc::new(interface);
        self.interfaces
            .borrow_mut()
            .insert(key(&interface.name), Rc::clone(&interface));
        interface
    }

    pub fn register_record(&self, record: RecordType) -> Rc<RecordType> {
        let record = Rc::new(record);
        self.records
            .borrow_mut()
            .insert(key(&record.name), Rc::clone(&record));
        record
    }

    /// Registers the type and, unless scoped, its members as bare names
    pub fn register_enum(&self, ty: EnumType) -> Rc<EnumType> {
        let ty = Rc::new(ty);
        if !ty.scoped {
            let mut values = self.enum_values.borrow_mut();
            for (member, ordinal) in ty.members() {
                values.insert(normalize(member), (Rc::clone(&ty), *ordinal));
            }
        }
        self.enums.borrow_mut().insert(key(&ty.name), Rc::clone(&ty));
        ty
    }

    pub fn register_array(&self, name: &str, ty: ArrayType) -> Rc<ArrayType> {
        let ty = Rc::new(ty);
        self.arrays.borrow_mut().insert(key(name), Rc::clone(&ty));
        ty
    }

    pub fn register_subrange(&self, ty: SubrangeType) -> Rc<SubrangeType> {
        let ty = Rc::new(ty);
        self.subranges
            .borrow_mut()
            .insert(key(&ty.name), Rc::clone(&ty));
        ty
    }

    pub fn register_function_pointer(&self, name: &str, ty: FunctionPointerType) -> Rc<FunctionPointerType> {
        let ty = Rc::new(ty);
        self.function_pointers
            .borrow_mut()
            .insert(key(name), Rc::clone(&ty));
        ty
    }

    pub fn register_helper(&self, type_name: &str, method: &str, helper: HelperMethod) {
        self.helpers
            .borrow_mut()
            .entry(key(type_name))
            .or_default()
            .insert(normalize(method), helper);
    }

    pub fn register_operator(&self, overload: OperatorOverload) {
        self.operators.borrow_mut().push(overload);
    }
}

impl TypeRegistry for TypeTable {
    fn lookup_class(&self, name: &str) -> Option<Rc<ClassInfo>> {
        self.classes.borrow().get(&key(name)).cloned()
    }

    fn lookup_interface(&self, name: &str) -> Option<Rc<InterfaceInfo>> {
        self.interfaces.borrow().get(&key(name)).cloned()
    }

    fn lookup_record(&self, name: &str) -> Option<Rc<RecordType>> {
        self.records.borrow().get(&key(name)).cloned()
    }

    fn lookup_enum(&self, name: &str) -> Option<Rc<EnumType>> {
        self.enums.borrow().get(&key(name)).cloned()
    }

    fn lookup_enum_value(&self, member: &str) -> Option<(Rc<EnumType>, i64)> {
        self.enum_values.borrow().get(&normalize(member)).cloned()
    }

    fn lookup_array(&self, name: &str) -> Option<Rc<ArrayType>> {
        self.arrays.borrow().get(&key(name)).cloned()
    }

    fn lookup_subrange(&self, name: &str) -> Option<Rc<SubrangeType>> {
        self.subranges.borrow().get(&key(name)).cloned()
    }

    fn lookup_function_pointer(&self, name: &str) -> Option<Rc<FunctionPointerType>> {
        self.function_pointers.borrow().get(&key(name)).cloned()
    }

    fn lookup_helper(&self, type_name: &str, method: &str) -> Option<HelperMethod> {
        self.helpers
            .borrow()
            .get(&key(type_name))
            .and_then(|methods| methods.get(&normalize(method)))
            .cloned()
    }

    fn lookup_operator(&self, op: BinOp, left: &str, right: &str) -> Option<String> {
        self.operators
            .borrow()
            .iter()
            .find(|o| o.op == op && same_name(&o.left, left) && same_name(&o.right, right))
            .map(|o| o.function.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_exception_hierarchy() {
        let table = TypeTable::standard();
        let assert_class = table.lookup_class("eassertionfailed").unwrap();
        assert!(assert_class.is_descendant_of("Exception"));
        assert!(assert_class.is_descendant_of("TObject"));
        assert!(assert_class.has_field("Message"));
        assert!(table.has_class("EScriptStackOverflow"));
    }

    #[test]
    fn test_lookup_strips_parent_suffix() {
        let table = TypeTable::new();
        table.register_class(ClassInfo::new("TSub", None));
        assert!(table.lookup_class("TSub(TBase)").is_some());
        assert!(table.lookup_class("tsub").is_some());
    }

    #[test]
    fn test_unscoped_enum_members_are_bare_names() {
        let table = TypeTable::new();
        table.register_enum(EnumType::sequential("TColor", &["Red", "Green"]));
        let (ty, ordinal) = table.lookup_enum_value("green").unwrap();
        assert_eq!(ty.name, "TColor");
        assert_eq!(ordinal, 1);
    }

    #[test]
    fn test_scoped_enum_members_hidden() {
        let table = TypeTable::new();
        table.register_enum(EnumType::new("TMode", vec![("Fast".to_string(), 0)], true));
        assert!(table.lookup_enum_value("Fast").is_none());
        assert!(table.lookup_enum("TMode").is_some());
    }

    #[test]
    fn test_standard_helpers_registered() {
        let table = TypeTable::standard();
        assert!(table.lookup_helper("String", "ToUpper").is_some());
        assert!(table.lookup_helper("string", "TOUPPER").is_some());
        assert!(table.lookup_helper("Integer", "Frobnicate").is_none());
    }

    #[test]
    fn test_operator_lookup() {
        let table = TypeTable::new();
        table.register_operator(OperatorOverload {
            op: BinOp::Add,
            left: "TVec".to_string(),
            right: "TVec".to_string(),
            function: "AddVecs".to_string(),
        });
        assert_eq!(table.lookup_operator(BinOp::Add, "tvec", "TVEC"), Some("AddVecs".to_string()));
        assert_eq!(table.lookup_operator(BinOp::Sub, "TVec", "TVec"), None);
    }
}
