//! Control-flow sends compiled in place instead of dispatched.
use parser::{AstArena, ExprId, ExprKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// `cond ifTrue: [..] ifFalse: [..]`
    IfTrueIfFalse,
    /// `from to: limit do: [:i | ..]`
    ToDo,
}

/// How a send is realised by the back end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendShape {
    Plain,
    Inlined(Intrinsic),
}

impl SendShape {
    pub fn is_inlined(self) -> bool {
        matches!(self, SendShape::Inlined(_))
    }
}

impl Intrinsic {
    pub fn selector(self) -> &'static str {
        match self {
            Intrinsic::IfTrueIfFalse => "ifTrue:ifFalse:",
            Intrinsic::ToDo => "to:do:",
        }
    }

    /// Positions of the arguments that are inlined blocks.
    pub fn inlined_args(self) -> &'static [usize] {
        match self {
            Intrinsic::IfTrueIfFalse => &[0, 1],
            Intrinsic::ToDo => &[1],
        }
    }

    /// Recognise an intrinsic by selector and argument shape. A send
    /// with the right selector but the wrong shape is a plain send.
    pub fn recognise(arena: &AstArena, selector: &str, args: &[ExprId]) -> Option<Intrinsic> {
        let block_params = |id: ExprId| match arena.kind(id) {
            ExprKind::Block { params, .. } => Some(params.len()),
            _ => None,
        };
        match (selector, args) {
            ("ifTrue:ifFalse:", [t, f]) => {
                (block_params(*t) == Some(0) && block_params(*f) == Some(0))
                    .then_some(Intrinsic::IfTrueIfFalse)
            }
            ("to:do:", [_, body]) => (block_params(*body) == Some(1)).then_some(Intrinsic::ToDo),
            _ => None,
        }
    }
}

/// Shape of the send node `id`, or `None` if it is not a send.
pub fn classify(arena: &AstArena, id: ExprId) -> Option<SendShape> {
    match arena.kind(id) {
        ExprKind::Send { selector, args, .. } => Some(
            Intrinsic::recognise(arena, selector, args)
                .map(SendShape::Inlined)
                .unwrap_or(SendShape::Plain),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::parse_source;

    fn shape_of(body: &str) -> Option<SendShape> {
        let unit =
            parse_source(&format!("T : nil [ m [ | c | {} ] ]", body)).expect("parse failed");
        let stmt = unit.classes[0].instance_methods[0].body[0];
        classify(&unit.arena, stmt)
    }

    #[test]
    fn recognises_conditional() {
        assert_eq!(
            shape_of("c ifTrue: [ 1 ] ifFalse: [ 2 ]"),
            Some(SendShape::Inlined(Intrinsic::IfTrueIfFalse))
        );
    }

    #[test]
    fn recognises_counted_loop() {
        assert_eq!(
            shape_of("1 to: 10 do: [:i | i]"),
            Some(SendShape::Inlined(Intrinsic::ToDo))
        );
    }

    #[test]
    fn conditional_with_non_block_argument_is_plain() {
        assert_eq!(shape_of("c ifTrue: [ 1 ] ifFalse: c"), Some(SendShape::Plain));
        assert_eq!(shape_of("c ifTrue: [ 1 ] ifFalse: ([ 2 ])"), Some(SendShape::Plain));
    }

    #[test]
    fn conditional_with_block_parameters_is_plain() {
        assert_eq!(shape_of("c ifTrue: [:x | 1 ] ifFalse: [ 2 ]"), Some(SendShape::Plain));
    }

    #[test]
    fn counted_loop_needs_one_parameter() {
        assert_eq!(shape_of("1 to: 10 do: [ 3 ]"), Some(SendShape::Plain));
        assert_eq!(shape_of("1 to: 10 do: [:a :b | 3 ]"), Some(SendShape::Plain));
        assert_eq!(shape_of("1 to: 10 do: c"), Some(SendShape::Plain));
    }

    #[test]
    fn other_selectors_are_plain() {
        assert_eq!(shape_of("c ifTrue: [ 1 ]"), Some(SendShape::Plain));
        assert_eq!(shape_of("c foo"), Some(SendShape::Plain));
        assert_eq!(shape_of("c"), None);
    }
}
