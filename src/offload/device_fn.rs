// Device function synthesis. A region's closure becomes the parameter list of a standalone
// function appended to the device image: read-only buffers first, then scalars, then every
// buffer the region writes. Within each group the closure's name order is kept. The call-site
// synthesizer marshals from this same list, which is what keeps the two sides in agreement.

use super::closure::Closure;
use super::runtime::DEVICE_FUNCTION_PREFIX;
use crate::device::{Argument, ArgumentKind, DeviceFunction, DeviceImage, Linkage};
use crate::ir::Stmt;

/// Name of the device function for the region `region_name`.
pub fn device_function_name(region_name: &str) -> String {
    format!("{DEVICE_FUNCTION_PREFIX}{region_name}")
}

/// The ordered parameter list for a region with this closure.
pub fn build_arguments(closure: &Closure) -> Vec<Argument> {
    let inputs = closure
        .input_buffers()
        .map(|(name, b)| Argument::new(name, ArgumentKind::InputBuffer, b.ty, b.dimensions));
    let scalars = closure.vars.iter().map(|(name, ty)| Argument::new(name.as_str(), ArgumentKind::InputScalar, *ty, 0));
    let outputs = closure
        .output_buffers()
        .map(|(name, b)| Argument::new(name, ArgumentKind::OutputBuffer, b.ty, b.dimensions));
    inputs.chain(scalars).chain(outputs).collect()
}

/// Append the device function running `body` to `image`.
pub fn synthesize_device_function<'a>(
    region_name: &str,
    body: Stmt,
    closure: &Closure,
    image: &'a mut DeviceImage,
) -> &'a DeviceFunction {
    let function = DeviceFunction {
        name: device_function_name(region_name),
        args: build_arguments(closure),
        body,
        linkage: Linkage::External,
    };
    log::trace!(
        "{}({})",
        function.name,
        function.args.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    );
    image.append(function)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceTarget;
    use crate::ir::{BinOp, DeviceApi, Expr, Type};

    #[test]
    fn arguments_are_grouped_by_kind() {
        // Written first, read last: order must not follow traversal.
        let i = Expr::var("i", Type::int(32));
        let body = Stmt::block([
            Stmt::store("z_out", Expr::load(Type::int(16), "b_in", vec![i.clone()]), vec![i.clone()]),
            Stmt::store("a_out", Expr::var("scale", Type::float(32)), vec![i.clone(), i.clone()]),
            Stmt::Evaluate(Expr::binary(BinOp::Add, Expr::load(Type::int(16), "a_in", vec![i.clone()]), Expr::var("k", Type::int(16)))),
        ]);
        let region = Stmt::for_loop("i", Expr::int(0), Expr::int(8), DeviceApi::Hexagon, body);
        let args = build_arguments(&Closure::extract(&region));

        let summary: Vec<_> = args.iter().map(|a| (a.name.as_str(), a.kind)).collect();
        assert_eq!(
            summary,
            [
                ("a_in", ArgumentKind::InputBuffer),
                ("b_in", ArgumentKind::InputBuffer),
                ("k", ArgumentKind::InputScalar),
                ("scale", ArgumentKind::InputScalar),
                ("a_out", ArgumentKind::OutputBuffer),
                ("z_out", ArgumentKind::OutputBuffer),
            ]
        );
        assert_eq!(args[4].dimensions, 2);
        assert_eq!(args[3].ty, Type::float(32));
    }

    #[test]
    fn appends_named_function() {
        let mut image = DeviceImage::new("hexagon", DeviceTarget::simulator());
        let body = Stmt::Evaluate(Expr::int(0));
        let f = synthesize_device_function("f.s0.y", body.clone(), &Closure::default(), &mut image);
        assert_eq!(f.name, "offload_f.s0.y");
        assert_eq!(f.argv_name(), "offload_f.s0.y_argv");
        assert!(f.args.is_empty());
        assert_eq!(image.len(), 1);
        assert_eq!(image.functions[0].body, body);
    }
}
